use std::sync::Arc;

use tracing::Instrument;

use super::strategy::{
    Availability, ExtractionStrategy, FileExtraction, LocalOcrStrategy, NativeTextStrategy,
    RemoteVisionStrategy,
};
use super::Deadline;
use crate::ai::VisionOcr;
use crate::error::ImportError;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::progress::ProgressReporter;
use crate::processor::{LocalOcrEngine, PageRenderer, SourceDocument};

/// Failure lists longer than this are cut to `… and N more`.
const MAX_REPORTED_FAILURES: usize = 3;

/// Separator between the text of consecutive files.
const FILE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub max_pages_per_document: u32,
    pub render_scale: f32,
    pub allow_local_ocr_fallback: bool,
}

impl ExtractionSettings {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            max_pages_per_document: config.max_pages_per_document,
            render_scale: config.render_scale,
            allow_local_ocr_fallback: config.allow_local_ocr_fallback,
        }
    }
}

/// What the cascade produced for one file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Text { strategy: &'static str, text: String },
    /// Every attempted strategy finished cleanly without finding text.
    Empty { notes: Vec<String> },
    /// At least one strategy failed and none produced text.
    Failed { message: String },
}

/// Text of all files of a job, joined in submission order.
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pub text: String,
    pub warnings: Vec<String>,
}

/// Runs the ordered strategy list over each file through a single dispatcher.
pub struct ExtractionOrchestrator {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    renderer: Arc<dyn PageRenderer>,
    settings: ExtractionSettings,
}

impl ExtractionOrchestrator {
    pub fn new(
        strategies: Vec<Box<dyn ExtractionStrategy>>,
        renderer: Arc<dyn PageRenderer>,
        settings: ExtractionSettings,
    ) -> Self {
        Self {
            strategies,
            renderer,
            settings,
        }
    }

    /// The standard cascade: native text, remote vision, local OCR.
    pub fn standard(
        vision: Option<Arc<dyn VisionOcr>>,
        local_ocr: Option<Arc<dyn LocalOcrEngine>>,
        renderer: Arc<dyn PageRenderer>,
        settings: ExtractionSettings,
    ) -> Self {
        Self::new(
            vec![
                Box::new(NativeTextStrategy),
                Box::new(RemoteVisionStrategy::new(vision)),
                Box::new(LocalOcrStrategy::new(local_ocr)),
            ],
            renderer,
            settings,
        )
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Extracts every file in order and joins the texts.
    ///
    /// A failed file ends the job; a file without text is skipped with a
    /// warning. No text at all is an extraction error.
    pub async fn extract_all(
        &self,
        docs: &[SourceDocument],
        consent_to_remote_ai: bool,
        deadline: &Deadline,
        progress: &dyn ProgressReporter,
    ) -> Result<ExtractedText, ImportError> {
        let mut texts = Vec::with_capacity(docs.len());
        let mut warnings = Vec::new();
        let mut empty_notes = Vec::new();

        for (index, doc) in docs.iter().enumerate() {
            deadline.check(&format!("extracting {}", doc.name))?;

            let file = FileExtraction::new(
                doc,
                index,
                docs.len(),
                consent_to_remote_ai,
                &self.settings,
                deadline,
                progress,
                Arc::clone(&self.renderer),
            );
            let span =
                tracing::info_span!("extract_file", file = %doc.name, kind = doc.kind.as_str());

            match self.extract_file(&file).instrument(span).await? {
                FileOutcome::Text { strategy, text } => {
                    tracing::info!(
                        file = %doc.name,
                        strategy = strategy,
                        chars = text.len(),
                        "Text extracted"
                    );
                    texts.push(text);
                }
                FileOutcome::Empty { notes } => {
                    tracing::warn!(file = %doc.name, "No text found, file skipped");
                    warnings.push(format!("No text found in {}", doc.name));
                    empty_notes.extend(notes.into_iter().map(|n| format!("{}: {}", doc.name, n)));
                }
                FileOutcome::Failed { message } => {
                    return Err(ImportError::Extraction(format!(
                        "Could not extract text from {}: {}",
                        doc.name, message
                    )));
                }
            }
            file.report(1.0, format!("Finished {}", doc.name), None);
        }

        if texts.is_empty() {
            let mut message = "No text could be extracted from the submitted files".to_string();
            if !empty_notes.is_empty() {
                message.push_str(&format!(" ({})", summarize(&empty_notes)));
            }
            return Err(ImportError::Extraction(message));
        }

        Ok(ExtractedText {
            text: texts.join(FILE_SEPARATOR),
            warnings,
        })
    }

    /// Evaluates the strategies in order until one yields text.
    pub async fn extract_file(
        &self,
        file: &FileExtraction<'_>,
    ) -> Result<FileOutcome, ImportError> {
        let mut failures = Vec::new();
        let mut notes = Vec::new();

        for strategy in &self.strategies {
            match strategy.availability(file) {
                Availability::Skipped(reason) => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        reason = %reason,
                        "Strategy skipped"
                    );
                    notes.push(format!("{} skipped ({})", strategy.name(), reason));
                    continue;
                }
                Availability::Available => {}
            }

            let result = strategy.extract(file).await?;
            if result.has_text() {
                return Ok(FileOutcome::Text {
                    strategy: strategy.name(),
                    text: result.text.trim().to_string(),
                });
            }
            match result.error {
                Some(error) if !result.success => {
                    failures.push(format!("{}: {}", strategy.name(), error));
                }
                _ => notes.push(format!("{} found no text", strategy.name())),
            }
        }

        if failures.is_empty() {
            Ok(FileOutcome::Empty { notes })
        } else {
            Ok(FileOutcome::Failed {
                message: summarize(&failures),
            })
        }
    }
}

/// Joins up to three entries and counts the rest.
pub fn summarize(entries: &[String]) -> String {
    let shown = entries
        .iter()
        .take(MAX_REPORTED_FAILURES)
        .cloned()
        .collect::<Vec<_>>()
        .join("; ");
    if entries.len() > MAX_REPORTED_FAILURES {
        format!("{} and {} more", shown, entries.len() - MAX_REPORTED_FAILURES)
    } else {
        shown
    }
}
