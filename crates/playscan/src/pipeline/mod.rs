//! Job execution: run context, progress reporting and the step runner.

pub mod config;
pub mod context;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use context::RunContext;
pub use progress::{
    ErrorDetails, NoopProgress, PersistedProgress, ProgressEvent, ProgressReporter, StageDetail,
    StreamEvent, StreamProgress, Tee,
};
pub use runner::{JobRunner, RunOutcome};
