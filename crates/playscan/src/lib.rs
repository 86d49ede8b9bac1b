pub mod ai;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod job;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod scene;
pub mod secrets;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod worker;

pub use config::{load_config, load_default_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, ImportError, ProcessError, Result, StageFailure, StorageError};
pub use job::{ImportJob, ImportMode, JobStatus, JobStore, ProcessingStage};
pub use pipeline::{JobRunner, PipelineConfig, ProgressReporter, RunOutcome, StreamEvent};
pub use scene::{ParsedScene, SceneLine};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use service::{ImportService, SubmitRequest, SweepReport};
pub use storage::{BlobStore, SceneSink};
pub use worker::SweepScheduler;
