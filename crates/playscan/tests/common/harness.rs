//! Test harness for isolated pipeline runs.
//!
//! The `TestHarness` wires a `JobRunner` and `ImportService` over an
//! in-memory database, an in-memory blob store, a scripted AI backend, a fake
//! OCR engine and a fake renderer. Every collaborator stays reachable so tests
//! can assert on call counts.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use playscan::ai::{AiStructurer, CompletionBackend, RemoteVisionOcr, SceneStructurer, VisionOcr};
use playscan::extraction::{ExtractionOrchestrator, ExtractionSettings};
use playscan::job::store::format_timestamp;
use playscan::pipeline::PipelineConfig;
use playscan::processor::{LocalOcrEngine, PageRenderer};
use playscan::storage::{JsonDirectorySink, SceneSink};
use playscan::{Database, ImportJob, ImportService, JobRunner, JobStore};

use super::fakes::{FakeOcr, FakeRenderer, MemoryBlobStore, ScriptedBackend};

pub const OWNER: &str = "owner-1";

pub struct TestHarness {
    temp_dir: TempDir,
    pub config: PipelineConfig,
    pub store: JobStore,
    pub blobs: Arc<MemoryBlobStore>,
    pub backend: Arc<ScriptedBackend>,
    pub ocr: Arc<FakeOcr>,
    pub renderer: Arc<FakeRenderer>,
    remote_ai: bool,
    local_ocr: bool,
    sink: bool,
}

impl TestHarness {
    /// Remote AI configured, local OCR available, no scene sink.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_in_memory().expect("Failed to open in-memory database");

        Self {
            temp_dir,
            config: PipelineConfig::default(),
            store: JobStore::new(db),
            blobs: Arc::new(MemoryBlobStore::default()),
            backend: Arc::new(ScriptedBackend::default()),
            ocr: Arc::new(FakeOcr::returning(super::fixtures::BALCONY_TEXT)),
            renderer: Arc::new(FakeRenderer::with_pages(2)),
            remote_ai: true,
            local_ocr: true,
            sink: false,
        }
    }

    pub fn without_remote_ai(mut self) -> Self {
        self.remote_ai = false;
        self
    }

    pub fn without_local_ocr(mut self) -> Self {
        self.local_ocr = false;
        self
    }

    pub fn with_sink(mut self) -> Self {
        self.sink = true;
        self
    }

    pub fn scenes_dir(&self) -> PathBuf {
        self.temp_dir.path().join("scenes")
    }

    /// Stores a file under the owner's namespace and returns its blob path.
    pub fn upload(&self, name: &str, bytes: Vec<u8>) -> String {
        let path = format!("{}/{}", OWNER, name);
        self.blobs.put(&path, bytes);
        path
    }

    pub fn runner(&self) -> JobRunner {
        let backend: Arc<dyn CompletionBackend> = self.backend.clone();

        let (vision, remote_structurer) = if self.remote_ai {
            let vision: Arc<dyn VisionOcr> =
                Arc::new(RemoteVisionOcr::new(Arc::clone(&backend), "vision-test"));
            let structurer: Arc<dyn SceneStructurer> =
                Arc::new(AiStructurer::new(backend, "text-test", 60_000));
            (Some(vision), Some(structurer))
        } else {
            (None, None)
        };
        let local_ocr: Option<Arc<dyn LocalOcrEngine>> = if self.local_ocr {
            Some(self.ocr.clone())
        } else {
            None
        };
        let renderer: Arc<dyn PageRenderer> = self.renderer.clone();

        let orchestrator = ExtractionOrchestrator::standard(
            vision,
            local_ocr,
            renderer,
            ExtractionSettings::from_pipeline(&self.config),
        );
        let sink = if self.sink {
            Some(Arc::new(JsonDirectorySink::new(self.scenes_dir())) as Arc<dyn SceneSink>)
        } else {
            None
        };

        JobRunner::new(
            Arc::new(self.config.clone()),
            self.store.clone(),
            self.blobs.clone(),
            orchestrator,
            remote_structurer,
            sink,
        )
    }

    pub fn service(&self) -> ImportService {
        ImportService::new(Arc::new(self.runner()))
    }

    pub fn job(&self, id: &str) -> ImportJob {
        self.store
            .get(id)
            .expect("Failed to load job")
            .expect("Job not found")
    }

    /// Inserts a job as if a previous run had died mid-way `age` ago.
    pub fn insert_stuck_job(
        &self,
        file_paths: Vec<String>,
        consent: bool,
        age: Duration,
    ) -> ImportJob {
        let job = ImportJob::new(OWNER, file_paths, consent, playscan::ImportMode::Preview);
        self.store.create(&job).expect("Failed to create job");
        self.store
            .claim(&job.id, &playscan::job::ClaimMode::Any)
            .expect("Failed to claim job")
            .expect("Job not claimable");
        self.backdate(&job.id, age);
        self.job(&job.id)
    }

    /// Moves `updated_at` into the past.
    pub fn backdate(&self, job_id: &str, age: Duration) {
        let updated_at = format_timestamp(Utc::now() - age);
        self.store
            .database()
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE import_jobs SET updated_at = ?2 WHERE id = ?1",
                    rusqlite::params![job_id, updated_at],
                )?;
                Ok(())
            })
            .expect("Failed to backdate job");
    }
}
