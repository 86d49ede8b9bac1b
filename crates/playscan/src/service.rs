//! Entry points for submitting, inspecting, retrying and sweeping import jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::error::ImportError;
use crate::job::{ClaimMode, ImportJob, ImportMode, JobStatus, JobStore};
use crate::pipeline::{
    ErrorDetails, JobRunner, NoopProgress, PipelineConfig, RunOutcome, StreamEvent, StreamProgress,
};
use crate::sanitize;

/// A request to import one or more files.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub owner_id: String,
    pub file_paths: Vec<String>,
    pub consent_to_remote_ai: bool,
    pub mode: ImportMode,
}

impl SubmitRequest {
    pub fn preview(owner_id: impl Into<String>, file_paths: Vec<String>, consent: bool) -> Self {
        Self {
            owner_id: owner_id.into(),
            file_paths,
            consent_to_remote_ai: consent,
            mode: ImportMode::Preview,
        }
    }

    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.mode = mode;
        self
    }

    fn into_job(self) -> ImportJob {
        ImportJob::new(
            &self.owner_id,
            self.file_paths,
            self.consent_to_remote_ai,
            self.mode,
        )
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale jobs found.
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Jobs another run claimed or superseded in the meantime.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct ImportService {
    runner: Arc<JobRunner>,
}

impl ImportService {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self { runner }
    }

    pub fn config(&self) -> &Arc<PipelineConfig> {
        self.runner.config()
    }

    fn store(&self) -> &JobStore {
        self.runner.store()
    }

    /// Creates a pending job and runs it on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: SubmitRequest) -> Result<ImportJob, ImportError> {
        let job = request.into_job();
        self.store().create(&job)?;
        tracing::info!(
            job_id = %job.id,
            owner = %sanitize::hash_id(&job.owner_id),
            files = job.file_paths.len(),
            "Import job submitted"
        );

        let runner = Arc::clone(&self.runner);
        let job_id = job.id.clone();
        tokio::spawn(async move {
            let outcome = runner.run(&job_id, ClaimMode::Any, &NoopProgress).await;
            tracing::debug!(
                job_id = %job_id,
                success = outcome.is_success(),
                "Background run finished"
            );
        });

        Ok(job)
    }

    /// Creates a job and runs it inline, forwarding progress to `events`.
    ///
    /// The channel always receives exactly one terminal event, also when the
    /// job could not be created.
    pub async fn submit_streaming(
        &self,
        request: SubmitRequest,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<ImportJob, ImportError> {
        let stream = StreamProgress::new(events);
        let job = request.into_job();

        if let Err(e) = self.store().create(&job) {
            let err = ImportError::from(e);
            stream.fail(
                err.to_string(),
                Some(ErrorDetails {
                    kind: err.kind().to_string(),
                    stage: crate::job::ProcessingStage::Validating,
                }),
            );
            return Err(err);
        }

        self.runner.run(&job.id, ClaimMode::Any, &stream).await;
        if !stream.is_finished() {
            stream.fail("Import ended without a result", None);
        }
        self.load(&job.id)
    }

    /// Owner-scoped lookup. Jobs of other owners are reported as missing.
    pub fn get_job(&self, owner_id: &str, job_id: &str) -> Result<ImportJob, ImportError> {
        match self.store().get(job_id)? {
            Some(job) if job.owner_id == owner_id => Ok(job),
            _ => Err(ImportError::validation(format!("Job {} not found", job_id))),
        }
    }

    pub fn list_jobs(&self, owner_id: &str, limit: u32) -> Result<Vec<ImportJob>, ImportError> {
        Ok(self.store().list_for_owner(owner_id, limit)?)
    }

    /// Re-runs a job from scratch and returns its final state.
    pub async fn retry_job(&self, owner_id: &str, job_id: &str) -> Result<ImportJob, ImportError> {
        let job = self.get_job(owner_id, job_id)?;
        if !job.status.is_runnable() {
            return Err(ImportError::validation(format!(
                "Job {} already finished with status {}",
                job.id, job.status
            )));
        }
        if job.status == JobStatus::Processing && !self.is_stale(&job) {
            return Err(ImportError::validation(format!(
                "Job {} is already running",
                job.id
            )));
        }

        tracing::info!(job_id = %job.id, attempts = job.attempt_count, "Retrying import job");
        let claim = ClaimMode::IfUnchangedSince(job.updated_at);
        match self.runner.run(&job.id, claim, &NoopProgress).await {
            RunOutcome::NotClaimed => Err(ImportError::validation(format!(
                "Job {} changed while the retry was starting",
                job.id
            ))),
            _ => self.load(&job.id),
        }
    }

    /// Runs every stale `pending` or `processing` job, oldest first.
    pub async fn sweep_stale_jobs(
        &self,
        stale_threshold: Duration,
        batch_limit: u32,
    ) -> Result<SweepReport, ImportError> {
        let threshold = chrono::Duration::from_std(stale_threshold)
            .map_err(|e| ImportError::Internal(format!("Invalid stale threshold: {}", e)))?;
        let stale = self.store().find_stale(threshold, batch_limit)?;

        let mut report = SweepReport {
            selected: stale.len(),
            ..SweepReport::default()
        };
        if stale.is_empty() {
            return Ok(report);
        }
        tracing::info!(count = stale.len(), "Sweeping stale import jobs");

        for job in stale {
            let claim = ClaimMode::IfUnchangedSince(job.updated_at);
            match self.runner.run(&job.id, claim, &NoopProgress).await {
                RunOutcome::PreviewReady(_) | RunOutcome::Completed { .. } => {
                    report.succeeded += 1
                }
                RunOutcome::Failed { .. } => report.failed += 1,
                RunOutcome::NotClaimed | RunOutcome::Superseded => report.skipped += 1,
            }
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "Stale job sweep finished"
        );
        Ok(report)
    }

    fn is_stale(&self, job: &ImportJob) -> bool {
        let age = Utc::now().signed_duration_since(job.updated_at);
        age.to_std()
            .map(|age| age >= self.config().stale_threshold)
            .unwrap_or(false)
    }

    fn load(&self, job_id: &str) -> Result<ImportJob, ImportError> {
        self.store()
            .get(job_id)?
            .ok_or_else(|| ImportError::Internal(format!("Job {} disappeared", job_id)))
    }
}
