//! In-process stand-ins for the external collaborators of a run.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use playscan::ai::{AiError, CompletionBackend, CompletionRequest, ContentPart};
use playscan::error::{ProcessError, StorageError};
use playscan::pipeline::{ProgressEvent, ProgressReporter};
use playscan::processor::render::{PageRenderer, RenderedPages};
use playscan::processor::{FileKind, LocalOcrEngine, PageImage, SourceDocument};
use playscan::storage::BlobStore;

// ── Blob store ──

#[derive(Default)]
pub struct MemoryBlobStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn put(&self, path: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(path.to_string(), bytes);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

// ── AI backend ──

/// What the fake service answers.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    ServerError,
    Timeout,
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Text(s.to_string())
    }

    fn into_result(self) -> Result<String, AiError> {
        match self {
            Reply::Text(text) => Ok(text),
            Reply::ServerError => Err(AiError::Api {
                status: 500,
                body: "upstream exploded".to_string(),
            }),
            Reply::Timeout => Err(AiError::Timeout(60_000)),
        }
    }
}

/// Answers vision requests (those carrying images) and structuring requests
/// (those asking for JSON) from separate scripts, and records every call.
pub struct ScriptedBackend {
    vision: Mutex<Reply>,
    vision_delay: Mutex<Option<Duration>>,
    structuring: Mutex<Reply>,
    vision_calls: AtomicUsize,
    structuring_calls: AtomicUsize,
    structuring_inputs: Mutex<Vec<String>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            vision: Mutex::new(Reply::text(crate::common::BALCONY_TEXT)),
            vision_delay: Mutex::new(None),
            structuring: Mutex::new(Reply::text(crate::common::BALCONY_JSON)),
            vision_calls: AtomicUsize::new(0),
            structuring_calls: AtomicUsize::new(0),
            structuring_inputs: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedBackend {
    pub fn set_vision(&self, reply: Reply) {
        *self.vision.lock().unwrap() = reply;
    }

    /// Makes every vision request take at least `delay`.
    pub fn set_vision_delay(&self, delay: Duration) {
        *self.vision_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_structuring(&self, reply: Reply) {
        *self.structuring.lock().unwrap() = reply;
    }

    pub fn vision_calls(&self) -> usize {
        self.vision_calls.load(Ordering::SeqCst)
    }

    pub fn structuring_calls(&self) -> usize {
        self.structuring_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.vision_calls() + self.structuring_calls()
    }

    pub fn structuring_inputs(&self) -> Vec<String> {
        self.structuring_inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError> {
        let has_images = request
            .parts
            .iter()
            .any(|p| matches!(p, ContentPart::PngImage(_)));

        if has_images {
            self.vision_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.vision_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            return self.vision.lock().unwrap().clone().into_result();
        }

        self.structuring_calls.fetch_add(1, Ordering::SeqCst);
        let input = request
            .parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::PngImage(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.structuring_inputs.lock().unwrap().push(input);
        self.structuring.lock().unwrap().clone().into_result()
    }
}

// ── Local OCR ──

/// Returns the same text for every page, or fails every page.
pub struct FakeOcr {
    reply: Mutex<Result<String, String>>,
    calls: AtomicUsize,
}

impl FakeOcr {
    pub fn returning(text: &str) -> Self {
        Self {
            reply: Mutex::new(Ok(text.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_reply(&self, reply: Result<&str, &str>) {
        *self.reply.lock().unwrap() = reply.map(str::to_string).map_err(str::to_string);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LocalOcrEngine for FakeOcr {
    fn recognize(&self, _png: &[u8]) -> Result<String, ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .lock()
            .unwrap()
            .clone()
            .map_err(ProcessError::OcrFailed)
    }
}

// ── Renderer ──

/// Pretends every PDF has `pages` pages; images are one page.
pub struct FakeRenderer {
    pages: u32,
    calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn with_pages(pages: u32) -> Self {
        Self {
            pages,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PageRenderer for FakeRenderer {
    fn render(
        &self,
        doc: &SourceDocument,
        max_pages: u32,
        _scale: f32,
    ) -> Result<RenderedPages, ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let total = match doc.kind {
            FileKind::Image => 1,
            FileKind::Pdf => self.pages,
        };
        let pages = (1..=total.min(max_pages))
            .map(|page| PageImage {
                page,
                png: crate::common::png(),
            })
            .collect();
        Ok(RenderedPages {
            pages,
            total_pages: total,
        })
    }
}

// ── Progress ──

/// Records every reported event.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Percentages of all stage events, in order.
    pub fn percentages(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Stage { percent, .. } => Some(percent),
                _ => None,
            })
            .collect()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
