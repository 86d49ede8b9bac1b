use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{info_span, Instrument};

use crate::ai::{
    AiClient, AiStructurer, CompletionBackend, LocalStructurer, RemoteVisionOcr, SceneStructurer,
    VisionOcr,
};
use crate::error::{ImportError, StageFailure, StorageError};
use crate::extraction::{Deadline, ExtractionOrchestrator, ExtractionSettings};
use crate::job::{ClaimMode, ImportJob, ImportMode, JobStore, ProcessingStage, RunLease};
use crate::processor::{
    prepare_document, LocalOcrEngine, PageRenderer, PopplerRenderer, TesseractEngine,
};
use crate::sanitize;
use crate::scene::ParsedScene;
use crate::storage::{validate_owner_path, BlobStore, FilesystemBlobStore, SceneSink};

use super::config::PipelineConfig;
use super::context::RunContext;
use super::progress::{PersistedProgress, ProgressEvent, ProgressReporter, StageDetail, Tee};

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    PreviewReady(ParsedScene),
    Completed { scene_id: String },
    Failed {
        stage: ProcessingStage,
        kind: &'static str,
        message: String,
    },
    /// The job was not in a runnable state, or another run claimed it first.
    NotClaimed,
    /// A newer run took the job over while this one was working.
    Superseded,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RunOutcome::PreviewReady(_) | RunOutcome::Completed { .. }
        )
    }
}

/// Why a run stopped early.
enum Halt {
    Failed(ImportError),
    Superseded,
}

impl From<ImportError> for Halt {
    fn from(err: ImportError) -> Self {
        Halt::Failed(err)
    }
}

/// Drives one job through validation, download, extraction, structuring and
/// finalization, persisting each step.
pub struct JobRunner {
    config: Arc<PipelineConfig>,
    store: JobStore,
    blobs: Arc<dyn BlobStore>,
    orchestrator: ExtractionOrchestrator,
    remote_structurer: Option<Arc<dyn SceneStructurer>>,
    local_structurer: Arc<dyn SceneStructurer>,
    sink: Option<Arc<dyn SceneSink>>,
}

impl JobRunner {
    /// Production constructor: filesystem blobs, poppler rendering, Tesseract
    /// and the remote AI client when a key is configured.
    pub fn from_config(
        config: Arc<PipelineConfig>,
        store: JobStore,
        sink: Option<Arc<dyn SceneSink>>,
    ) -> Result<Self, ImportError> {
        let blobs: Arc<dyn BlobStore> = Arc::new(FilesystemBlobStore::new(&config.blob_root));
        let renderer: Arc<dyn PageRenderer> = Arc::new(PopplerRenderer::new());

        let (vision, remote_structurer) = match config.ai_api_key.clone() {
            Some(key) => {
                let client = AiClient::new(&config.ai, key)
                    .map_err(|e| ImportError::Internal(e.to_string()))?;
                let backend: Arc<dyn CompletionBackend> = Arc::new(client);
                let vision: Arc<dyn VisionOcr> = Arc::new(RemoteVisionOcr::new(
                    Arc::clone(&backend),
                    config.ai.vision_model.clone(),
                ));
                let structurer: Arc<dyn SceneStructurer> = Arc::new(AiStructurer::new(
                    backend,
                    config.ai.text_model.clone(),
                    config.ai.max_input_chars,
                ));
                (Some(vision), Some(structurer))
            }
            None => (None, None),
        };

        let local_ocr: Option<Arc<dyn LocalOcrEngine>> = if config.allow_local_ocr_fallback {
            let engine = TesseractEngine::new(&config.ocr_languages);
            if engine.is_available() {
                Some(Arc::new(engine))
            } else {
                tracing::warn!(
                    languages = engine.languages(),
                    "Tesseract unavailable, local OCR fallback disabled"
                );
                None
            }
        } else {
            None
        };

        let orchestrator = ExtractionOrchestrator::standard(
            vision,
            local_ocr,
            renderer,
            ExtractionSettings::from_pipeline(&config),
        );

        Ok(Self::new(
            config,
            store,
            blobs,
            orchestrator,
            remote_structurer,
            sink,
        ))
    }

    /// Wires explicit components; the local structurer is always available.
    pub fn new(
        config: Arc<PipelineConfig>,
        store: JobStore,
        blobs: Arc<dyn BlobStore>,
        orchestrator: ExtractionOrchestrator,
        remote_structurer: Option<Arc<dyn SceneStructurer>>,
        sink: Option<Arc<dyn SceneSink>>,
    ) -> Self {
        Self {
            config,
            store,
            blobs,
            orchestrator,
            remote_structurer,
            local_structurer: Arc::new(LocalStructurer::new()),
            sink,
        }
    }

    pub fn config(&self) -> &Arc<PipelineConfig> {
        &self.config
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Runs a job to a terminal state. Never returns an error: failures are
    /// persisted on the job and reported to `progress`.
    pub async fn run(
        &self,
        job_id: &str,
        claim: ClaimMode,
        progress: &dyn ProgressReporter,
    ) -> RunOutcome {
        let lease = match self.store.claim(job_id, &claim) {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                tracing::info!(job_id = %job_id, "Job not claimable, skipping run");
                progress.report(ProgressEvent::Failed {
                    stage: ProcessingStage::Validating,
                    kind: "validation",
                    error: "Job is not in a runnable state".to_string(),
                });
                return RunOutcome::NotClaimed;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to claim job");
                let err = ImportError::Persistence(e);
                progress.report(ProgressEvent::Failed {
                    stage: ProcessingStage::Validating,
                    kind: err.kind(),
                    error: err.to_string(),
                });
                return RunOutcome::Failed {
                    stage: ProcessingStage::Validating,
                    kind: err.kind(),
                    message: err.to_string(),
                };
            }
        };

        let job = match self.store.get(job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                let err = ImportError::Internal(format!("Job {} vanished after claim", job_id));
                let failure = StageFailure::new(ProcessingStage::Validating, err);
                return self.fail(job_id, lease, failure, progress);
            }
            Err(e) => {
                return self.fail(
                    job_id,
                    lease,
                    StageFailure::new(ProcessingStage::Validating, e.into()),
                    progress,
                )
            }
        };

        let span = info_span!("import_job",
            job_id = %job.id,
            owner = %sanitize::hash_id(&job.owner_id),
            files = job.file_paths.len(),
            attempt = lease.attempt,
            mode = job.mode.as_str(),
        );

        let persisted = PersistedProgress::new(self.store.clone(), job.id.clone(), lease);
        let tee = Tee::new(&persisted, progress);
        let mut ctx = RunContext::new(job, lease, Deadline::start(self.config.soft_timeout_ms));

        let result = AssertUnwindSafe(self.execute(&mut ctx, &tee, &persisted))
            .catch_unwind()
            .instrument(span)
            .await;

        match result {
            Ok(Ok(())) => {
                let draft = ctx.draft.clone().unwrap_or_else(empty_scene);
                tracing::info!(
                    job_id = %ctx.job.id,
                    characters = draft.characters.len(),
                    lines = draft.lines.len(),
                    warnings = ctx.warnings.len(),
                    "Import finished"
                );
                progress.report(ProgressEvent::Done {
                    mode: ctx.job.mode,
                    scene_id: ctx.scene_id.clone(),
                    draft: draft.clone(),
                });
                match ctx.scene_id {
                    Some(scene_id) => RunOutcome::Completed { scene_id },
                    None => RunOutcome::PreviewReady(draft),
                }
            }
            Ok(Err(Halt::Superseded)) => {
                tracing::info!(job_id = %ctx.job.id, "Run superseded by a newer attempt, stopping");
                progress.report(ProgressEvent::Failed {
                    stage: ctx.stage,
                    kind: "internal",
                    error: "Job was taken over by a newer run".to_string(),
                });
                RunOutcome::Superseded
            }
            Ok(Err(Halt::Failed(err))) => {
                let failure = StageFailure::new(ctx.stage, err);
                self.fail(&ctx.job.id, lease, failure, progress)
            }
            Err(_) => {
                let err = ImportError::Internal("Unexpected panic while processing".to_string());
                let failure = StageFailure::new(ctx.stage, err);
                self.fail(&ctx.job.id, lease, failure, progress)
            }
        }
    }

    async fn execute(
        &self,
        ctx: &mut RunContext,
        progress: &dyn ProgressReporter,
        persisted: &PersistedProgress,
    ) -> Result<(), Halt> {
        // Step 1: Validate submission
        ctx.stage = ProcessingStage::Validating;
        {
            let _step = info_span!("validate").entered();
            self.step_validate(ctx, progress)?;
        }
        ensure_current(persisted)?;

        // Step 2: Download files
        ctx.stage = ProcessingStage::Downloading;
        ctx.deadline.check("starting downloads")?;
        self.step_download(ctx, progress)
            .instrument(info_span!("download"))
            .await?;
        ensure_current(persisted)?;

        // Step 3: Extract text
        ctx.stage = ProcessingStage::Extracting;
        ctx.deadline.check("starting extraction")?;
        self.step_extract(ctx, progress)
            .instrument(info_span!("extract"))
            .await?;
        ensure_current(persisted)?;

        // Step 4: Structure
        ctx.stage = ProcessingStage::Parsing;
        ctx.deadline.check("starting structuring")?;
        self.step_structure(ctx, progress)
            .instrument(info_span!("structure"))
            .await?;
        ensure_current(persisted)?;

        // Step 5: Finalize
        ctx.stage = ProcessingStage::Finalizing;
        self.step_finalize(ctx, progress)
            .instrument(info_span!("finalize"))
            .await
    }

    fn step_validate(&self, ctx: &RunContext, progress: &dyn ProgressReporter) -> Result<(), Halt> {
        progress.report(ProgressEvent::stage(
            ProcessingStage::Validating,
            0,
            "Validating submission",
        ));
        validate_submission(&self.config, &ctx.job, self.sink.is_some())?;
        progress.report(ProgressEvent::stage(
            ProcessingStage::Validating,
            ProcessingStage::Validating.band().1,
            "Submission validated",
        ));
        Ok(())
    }

    async fn step_download(
        &self,
        ctx: &mut RunContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), Halt> {
        let total = ctx.job.file_paths.len();
        let mut documents = Vec::with_capacity(total);

        for (i, path) in ctx.job.file_paths.iter().enumerate() {
            let name = sanitize::redact_blob_path(path);
            ctx.deadline.check(&format!("downloading {}", name))?;
            progress.report(ProgressEvent::Stage {
                stage: ProcessingStage::Downloading,
                percent: ProcessingStage::Downloading.percent_at(i as f64 / total as f64),
                message: format!("Downloading {}", name),
                detail: StageDetail::file(i + 1, total, &name),
            });

            let bytes = self.blobs.fetch(path).await.map_err(|e| match e {
                err @ StorageError::OutsideNamespace { .. } => ImportError::from(err),
                other => ImportError::Download {
                    path: name.clone(),
                    reason: other.to_string(),
                },
            })?;
            let doc = prepare_document(path, bytes, self.config.max_file_size_bytes)
                .map_err(ImportError::from)?;
            documents.push(doc);
        }

        progress.report(ProgressEvent::stage(
            ProcessingStage::Downloading,
            ProcessingStage::Downloading.band().1,
            format!("Downloaded {} file(s)", total),
        ));
        ctx.documents = documents;
        Ok(())
    }

    async fn step_extract(
        &self,
        ctx: &mut RunContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), Halt> {
        progress.report(ProgressEvent::stage(
            ProcessingStage::Extracting,
            ProcessingStage::Extracting.band().0,
            "Extracting text",
        ));
        let extracted = self
            .orchestrator
            .extract_all(
                &ctx.documents,
                ctx.job.consent_to_remote_ai,
                &ctx.deadline,
                progress,
            )
            .await?;

        ctx.warnings.extend(extracted.warnings);
        ctx.raw_text = Some(extracted.text);
        // File contents are no longer needed.
        ctx.documents.clear();
        Ok(())
    }

    async fn step_structure(
        &self,
        ctx: &mut RunContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), Halt> {
        let raw_text = ctx
            .raw_text
            .as_deref()
            .ok_or_else(|| ImportError::Internal("Structuring without extracted text".into()))?;

        let (structurer, label) = match (&self.remote_structurer, ctx.job.consent_to_remote_ai) {
            (Some(remote), true) => (remote, "remote"),
            _ => (&self.local_structurer, "local"),
        };
        progress.report(ProgressEvent::stage(
            ProcessingStage::Parsing,
            ProcessingStage::Parsing.band().0,
            "Identifying characters and dialogue",
        ));
        tracing::debug!(structurer = label, chars = raw_text.len(), "Structuring text");

        let draft = structurer.structure(raw_text).await?;
        if !draft.is_well_formed() {
            let err = ImportError::Structuring("Structured scene failed validation".into());
            return Err(err.into());
        }
        progress.report(ProgressEvent::stage(
            ProcessingStage::Parsing,
            ProcessingStage::Parsing.band().1,
            format!(
                "Found {} character(s) and {} line(s)",
                draft.characters.len(),
                draft.lines.len()
            ),
        ));
        ctx.draft = Some(draft);
        Ok(())
    }

    async fn step_finalize(
        &self,
        ctx: &mut RunContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), Halt> {
        let draft = ctx
            .draft
            .as_ref()
            .ok_or_else(|| ImportError::Internal("Finalizing without a draft".into()))?;

        progress.report(ProgressEvent::stage(
            ProcessingStage::Finalizing,
            ProcessingStage::Finalizing.band().0,
            "Saving draft",
        ));

        let id = ctx.job.id.as_str();
        match ctx.job.mode {
            ImportMode::Preview => {
                if !self
                    .store
                    .mark_preview_ready(id, ctx.lease, draft)
                    .map_err(ImportError::from)?
                {
                    return Err(Halt::Superseded);
                }
            }
            ImportMode::Create => {
                let sink = self.sink.as_ref().ok_or_else(|| {
                    ImportError::validation("Create mode requires a scene sink")
                })?;
                // A run that already lost its lease must not create a scene.
                if !self
                    .store
                    .holds_lease(id, ctx.lease)
                    .map_err(ImportError::from)?
                {
                    return Err(Halt::Superseded);
                }
                let scene_id = sink
                    .commit(&ctx.job.owner_id, draft)
                    .await
                    .map_err(|e| {
                        ImportError::Internal(format!("Failed to commit scene: {}", e))
                    })?;

                let recorded = self
                    .store
                    .mark_completed(id, ctx.lease, draft, &scene_id)
                    .map_err(|e| {
                        tracing::error!(
                            job_id = %id,
                            scene_id = %scene_id,
                            error = %e,
                            "Scene committed but job completion was not recorded"
                        );
                        ImportError::from(e)
                    })?;
                if !recorded {
                    tracing::warn!(
                        job_id = %id,
                        scene_id = %scene_id,
                        "Run superseded after committing its scene"
                    );
                    return Err(Halt::Superseded);
                }
                ctx.scene_id = Some(scene_id);
            }
        }
        Ok(())
    }

    /// Persists the failure and emits the terminal error event.
    fn fail(
        &self,
        job_id: &str,
        lease: RunLease,
        failure: StageFailure,
        progress: &dyn ProgressReporter,
    ) -> RunOutcome {
        let kind = failure.error.kind();
        let message = failure.error.to_string();
        tracing::warn!(
            job_id = %job_id,
            stage = failure.stage.as_str(),
            kind = kind,
            "{}",
            failure
        );

        match self
            .store
            .mark_error(job_id, lease, failure.stage, kind, &message)
        {
            Ok(true) => {}
            Ok(false) if self.was_superseded(job_id, lease) => {
                tracing::info!(job_id = %job_id, "Error not recorded, run was superseded");
                progress.report(ProgressEvent::Failed {
                    stage: failure.stage,
                    kind: "internal",
                    error: "Job was taken over by a newer run".to_string(),
                });
                return RunOutcome::Superseded;
            }
            Ok(false) => {
                tracing::error!(
                    job_id = %job_id,
                    "Error not recorded, job already left processing"
                );
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to record job error");
            }
        }

        progress.report(ProgressEvent::Failed {
            stage: failure.stage,
            kind,
            error: message.clone(),
        });
        RunOutcome::Failed {
            stage: failure.stage,
            kind,
            message,
        }
    }

    /// A newer claim bumped the attempt counter past this run's lease.
    fn was_superseded(&self, job_id: &str, lease: RunLease) -> bool {
        match self.store.get(job_id) {
            Ok(Some(job)) => job.attempt_count != lease.attempt,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    "Could not re-read job after failed write"
                );
                false
            }
        }
    }
}

/// Checks run by the validating step before any file is touched.
fn validate_submission(
    config: &PipelineConfig,
    job: &ImportJob,
    has_sink: bool,
) -> Result<(), ImportError> {
    if job.file_paths.is_empty() {
        return Err(ImportError::validation("No files submitted"));
    }
    if job.file_paths.len() > config.max_files_per_job as usize {
        return Err(ImportError::validation(format!(
            "Too many files: {} submitted, at most {} allowed",
            job.file_paths.len(),
            config.max_files_per_job
        )));
    }
    for path in &job.file_paths {
        validate_owner_path(&job.owner_id, path)?;
    }
    if config.require_ai_consent && !job.consent_to_remote_ai {
        return Err(ImportError::validation(
            "Consent to remote AI processing is required for imports",
        ));
    }
    if job.mode == ImportMode::Create && !has_sink {
        return Err(ImportError::validation(
            "Create mode is not available: no scene storage is configured",
        ));
    }
    Ok(())
}

fn ensure_current(persisted: &PersistedProgress) -> Result<(), Halt> {
    if persisted.is_superseded() {
        Err(Halt::Superseded)
    } else {
        Ok(())
    }
}

fn empty_scene() -> ParsedScene {
    ParsedScene {
        title: String::new(),
        author: None,
        characters: Vec::new(),
        lines: Vec::new(),
    }
}
