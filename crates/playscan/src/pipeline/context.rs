use crate::extraction::Deadline;
use crate::job::{ImportJob, ProcessingStage, RunLease};
use crate::processor::SourceDocument;
use crate::scene::ParsedScene;

pub struct RunContext {
    // Input
    pub job: ImportJob,
    pub lease: RunLease,
    pub deadline: Deadline,

    /// Stage currently executing; failures are recorded against it.
    pub stage: ProcessingStage,

    // Download result
    pub documents: Vec<SourceDocument>,

    // Extraction result
    pub raw_text: Option<String>,

    // Structuring result
    pub draft: Option<ParsedScene>,

    // Set when a create-mode commit succeeded
    pub scene_id: Option<String>,

    // Non-fatal warnings
    pub warnings: Vec<String>,
}

impl RunContext {
    pub fn new(job: ImportJob, lease: RunLease, deadline: Deadline) -> Self {
        Self {
            job,
            lease,
            deadline,
            stage: ProcessingStage::Validating,
            documents: Vec::new(),
            raw_text: None,
            draft: None,
            scene_id: None,
            warnings: Vec::new(),
        }
    }
}
