use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::job::{ImportMode, JobStore, ProcessingStage, RunLease};
use crate::scene::ParsedScene;

/// Where a progress update sits inside the current stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageDetail {
    /// 1-based index of the file being worked on.
    pub current: Option<u32>,
    pub total: Option<u32>,
    pub file_name: Option<String>,
    /// 1-based page inside the current file.
    pub page: Option<u32>,
    pub total_pages: Option<u32>,
}

impl StageDetail {
    pub fn file(current: usize, total: usize, file_name: &str) -> Self {
        Self {
            current: Some(current as u32),
            total: Some(total as u32),
            file_name: Some(file_name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_page(mut self, page: u32, total_pages: u32) -> Self {
        self.page = Some(page);
        self.total_pages = Some(total_pages);
        self
    }
}

/// Events emitted by the runner while a job advances.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Stage {
        stage: ProcessingStage,
        percent: u8,
        message: String,
        detail: StageDetail,
    },
    Done {
        mode: ImportMode,
        scene_id: Option<String>,
        draft: ParsedScene,
    },
    Failed {
        stage: ProcessingStage,
        kind: &'static str,
        error: String,
    },
}

impl ProgressEvent {
    pub fn stage(stage: ProcessingStage, percent: u8, message: impl Into<String>) -> Self {
        ProgressEvent::Stage {
            stage,
            percent,
            message: message.into(),
            detail: StageDetail::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Stage { .. })
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for background runs and unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Fans every event out to two reporters.
pub struct Tee<'a> {
    first: &'a dyn ProgressReporter,
    second: &'a dyn ProgressReporter,
}

impl<'a> Tee<'a> {
    pub fn new(first: &'a dyn ProgressReporter, second: &'a dyn ProgressReporter) -> Self {
        Self { first, second }
    }
}

impl ProgressReporter for Tee<'_> {
    fn report(&self, event: ProgressEvent) {
        self.first.report(event.clone());
        self.second.report(event);
    }
}

// ── Streaming ──

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub kind: String,
    pub stage: ProcessingStage,
}

/// Wire form of a progress event, one JSON object per line.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    Progress {
        stage: ProcessingStage,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Overall completion, `0.0..=1.0`.
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        page: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_pages: Option<u32>,
    },
    Done {
        mode: ImportMode,
        #[serde(skip_serializing_if = "Option::is_none")]
        scene_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        draft: Option<ParsedScene>,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<ErrorDetails>,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Progress { .. })
    }

    /// NDJSON line without the trailing newline.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","error":"Failed to encode event: {}"}}"#, e)
        })
    }
}

/// Forwards events to a channel as [`StreamEvent`]s.
///
/// At most one terminal event is sent and nothing follows it. Progress never
/// goes backwards on the stream.
pub struct StreamProgress {
    tx: mpsc::UnboundedSender<StreamEvent>,
    finished: AtomicBool,
    last_percent: AtomicU8,
}

impl StreamProgress {
    pub fn new(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            tx,
            finished: AtomicBool::new(false),
            last_percent: AtomicU8::new(0),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Sends a terminal error unless one was already sent.
    pub fn fail(&self, error: impl Into<String>, details: Option<ErrorDetails>) {
        self.send(StreamEvent::Error {
            error: error.into(),
            details,
        });
    }

    fn send(&self, event: StreamEvent) {
        if event.is_terminal() {
            if self.finished.swap(true, Ordering::SeqCst) {
                return;
            }
        } else if self.is_finished() {
            return;
        }
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl ProgressReporter for StreamProgress {
    fn report(&self, event: ProgressEvent) {
        let stream_event = match event {
            ProgressEvent::Stage {
                stage,
                percent,
                message,
                detail,
            } => {
                let percent = self.last_percent.fetch_max(percent, Ordering::SeqCst).max(percent);
                StreamEvent::Progress {
                    stage,
                    message: Some(message),
                    progress: Some(f64::from(percent) / 100.0),
                    current: detail.current,
                    total: detail.total,
                    file_name: detail.file_name,
                    page: detail.page,
                    total_pages: detail.total_pages,
                }
            }
            ProgressEvent::Done {
                mode,
                scene_id,
                draft,
            } => StreamEvent::Done {
                mode,
                scene_id,
                draft: Some(draft),
            },
            ProgressEvent::Failed { stage, kind, error } => StreamEvent::Error {
                error,
                details: Some(ErrorDetails {
                    kind: kind.to_string(),
                    stage,
                }),
            },
        };
        self.send(stream_event);
    }
}

// ── Persistence ──

/// Writes stage, percentage and message onto the job record under a run lease.
///
/// Terminal events are left to the runner, which records them together with
/// the draft or the error. Once a write is refused because a newer run took
/// the job over, the reporter marks itself superseded and stops writing.
/// A failed progress write is logged and does not stop the run.
///
/// Writes happen inline on the calling task: each is one primary-key UPDATE,
/// and the runner reads [`is_superseded`](Self::is_superseded) between steps,
/// so a write must have landed before `report` returns. This also keeps
/// reporting usable on a current-thread runtime such as the sweeper's.
pub struct PersistedProgress {
    store: JobStore,
    job_id: String,
    lease: RunLease,
    superseded: AtomicBool,
}

impl PersistedProgress {
    pub fn new(store: JobStore, job_id: impl Into<String>, lease: RunLease) -> Self {
        Self {
            store,
            job_id: job_id.into(),
            lease,
            superseded: AtomicBool::new(false),
        }
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::SeqCst)
    }

    pub fn mark_superseded(&self) {
        self.superseded.store(true, Ordering::SeqCst);
    }
}

impl ProgressReporter for PersistedProgress {
    fn report(&self, event: ProgressEvent) {
        let ProgressEvent::Stage {
            stage,
            percent,
            message,
            ..
        } = event
        else {
            return;
        };
        if self.is_superseded() {
            return;
        }

        match self
            .store
            .record_progress(&self.job_id, self.lease, stage, percent, &message)
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(
                    job_id = %self.job_id,
                    attempt = self.lease.attempt,
                    "Run superseded, progress no longer recorded"
                );
                self.mark_superseded();
            }
            Err(e) => {
                tracing::warn!(job_id = %self.job_id, error = %e, "Failed to record progress");
            }
        }
    }
}
