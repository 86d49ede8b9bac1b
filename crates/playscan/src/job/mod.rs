pub mod model;
pub mod store;

pub use model::{ImportJob, ImportMode, JobStatus, ProcessingStage};
pub use store::{ClaimMode, JobStore, RunLease};
