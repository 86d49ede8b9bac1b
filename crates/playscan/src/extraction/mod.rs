//! Text extraction cascade: native PDF text, remote vision OCR, local OCR.

pub mod deadline;
pub mod orchestrator;
pub mod strategy;

pub use deadline::Deadline;
pub use orchestrator::{ExtractedText, ExtractionOrchestrator, ExtractionSettings, FileOutcome};
pub use strategy::{
    Availability, ExtractionStrategy, FileExtraction, LocalOcrStrategy, NativeTextStrategy,
    RemoteVisionStrategy,
};

/// Uniform answer of every extraction strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub text: String,
    pub success: bool,
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn has_text(&self) -> bool {
        self.success && !self.text.trim().is_empty()
    }
}
