use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::{Deadline, ExtractionResult, ExtractionSettings};
use crate::ai::VisionOcr;
use crate::error::ImportError;
use crate::job::ProcessingStage;
use crate::pipeline::progress::{ProgressEvent, ProgressReporter, StageDetail};
use crate::processor::pdf::{extract_native_text, PAGE_BREAK};
use crate::processor::render::RenderedPages;
use crate::processor::{FileKind, LocalOcrEngine, PageRenderer, SourceDocument};

/// Whether a strategy applies to the current file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Skipped(String),
}

/// One step of the extraction cascade.
///
/// `extract` reports ordinary failures inside the [`ExtractionResult`]; an
/// `Err` ends the whole job (soft deadline exceeded).
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn availability(&self, file: &FileExtraction<'_>) -> Availability;

    async fn extract(&self, file: &FileExtraction<'_>) -> Result<ExtractionResult, ImportError>;
}

/// Everything a strategy may need about the file being extracted.
///
/// Rendering happens lazily, at most once, and is shared between strategies.
pub struct FileExtraction<'a> {
    pub doc: &'a SourceDocument,
    /// 0-based position in the submission.
    pub index: usize,
    pub total_files: usize,
    pub consent_to_remote_ai: bool,
    pub settings: &'a ExtractionSettings,
    pub deadline: &'a Deadline,
    pub progress: &'a dyn ProgressReporter,
    renderer: Arc<dyn PageRenderer>,
    rendered: OnceCell<Result<Arc<RenderedPages>, String>>,
}

impl<'a> FileExtraction<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        doc: &'a SourceDocument,
        index: usize,
        total_files: usize,
        consent_to_remote_ai: bool,
        settings: &'a ExtractionSettings,
        deadline: &'a Deadline,
        progress: &'a dyn ProgressReporter,
        renderer: Arc<dyn PageRenderer>,
    ) -> Self {
        Self {
            doc,
            index,
            total_files,
            consent_to_remote_ai,
            settings,
            deadline,
            progress,
            renderer,
            rendered: OnceCell::new(),
        }
    }

    /// Rendered pages of this file, rendering on first use.
    pub async fn pages(&self) -> Result<Arc<RenderedPages>, String> {
        self.rendered
            .get_or_init(|| async {
                self.report(0.0, format!("Rendering {}", self.doc.name), None);
                let renderer = Arc::clone(&self.renderer);
                let doc = self.doc.clone();
                let max_pages = self.settings.max_pages_per_document;
                let scale = self.settings.render_scale;

                match tokio::task::spawn_blocking(move || renderer.render(&doc, max_pages, scale))
                    .await
                {
                    Ok(Ok(pages)) => Ok(Arc::new(pages)),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(e) => Err(format!("Render task failed: {}", e)),
                }
            })
            .await
            .clone()
    }

    /// Emits an extracting-stage progress event; `fraction` is the position
    /// inside this file.
    pub fn report(&self, fraction: f64, message: String, page: Option<(u32, u32)>) {
        let total = self.total_files.max(1) as f64;
        let overall = (self.index as f64 + fraction.clamp(0.0, 1.0)) / total;
        let mut detail = StageDetail::file(self.index + 1, self.total_files, &self.doc.name);
        if let Some((page, total_pages)) = page {
            detail = detail.with_page(page, total_pages);
        }
        self.progress.report(ProgressEvent::Stage {
            stage: ProcessingStage::Extracting,
            percent: ProcessingStage::Extracting.percent_at(overall),
            message,
            detail,
        });
    }
}

// ── Native PDF text ──

pub struct NativeTextStrategy;

#[async_trait]
impl ExtractionStrategy for NativeTextStrategy {
    fn name(&self) -> &'static str {
        "native_text"
    }

    fn availability(&self, file: &FileExtraction<'_>) -> Availability {
        match file.doc.kind {
            FileKind::Pdf => Availability::Available,
            FileKind::Image => Availability::Skipped("not a PDF".to_string()),
        }
    }

    async fn extract(&self, file: &FileExtraction<'_>) -> Result<ExtractionResult, ImportError> {
        file.report(0.0, format!("Reading embedded text of {}", file.doc.name), None);
        let bytes = file.doc.bytes.clone();

        let native = match tokio::task::spawn_blocking(move || extract_native_text(&bytes)).await {
            Ok(Ok(native)) => native,
            Ok(Err(e)) => return Ok(ExtractionResult::failed(e.to_string())),
            Err(e) => return Ok(ExtractionResult::failed(format!("Text task failed: {}", e))),
        };

        if native.is_usable() {
            Ok(ExtractionResult::ok(native.text))
        } else {
            tracing::debug!(
                file = %file.doc.name,
                pages = native.page_count,
                "No usable embedded text"
            );
            Ok(ExtractionResult::ok(""))
        }
    }
}

// ── Remote vision OCR ──

pub struct RemoteVisionStrategy {
    vision: Option<Arc<dyn VisionOcr>>,
}

impl RemoteVisionStrategy {
    /// `None` means the remote service is not configured.
    pub fn new(vision: Option<Arc<dyn VisionOcr>>) -> Self {
        Self { vision }
    }
}

#[async_trait]
impl ExtractionStrategy for RemoteVisionStrategy {
    fn name(&self) -> &'static str {
        "remote_vision"
    }

    fn availability(&self, file: &FileExtraction<'_>) -> Availability {
        if !file.consent_to_remote_ai {
            Availability::Skipped("no consent to remote AI".to_string())
        } else if self.vision.is_none() {
            Availability::Skipped("remote vision not configured".to_string())
        } else {
            Availability::Available
        }
    }

    async fn extract(&self, file: &FileExtraction<'_>) -> Result<ExtractionResult, ImportError> {
        let Some(vision) = self.vision.as_ref() else {
            return Ok(ExtractionResult::failed("remote vision not configured"));
        };

        let rendered = match file.pages().await {
            Ok(rendered) => rendered,
            Err(e) => return Ok(ExtractionResult::failed(e)),
        };
        file.deadline
            .check(&format!("rendering {}", file.doc.name))?;

        let page_count = rendered.pages.len() as u32;
        file.report(
            0.1,
            format!("Transcribing {} page(s) of {}", page_count, file.doc.name),
            Some((1, page_count)),
        );

        match vision.transcribe(&file.doc.name, &rendered.pages).await {
            Ok(text) => Ok(ExtractionResult::ok(text)),
            Err(e) => {
                tracing::warn!(file = %file.doc.name, error = %e, "Remote vision OCR failed");
                Ok(ExtractionResult::failed(e.to_string()))
            }
        }
    }
}

// ── Local OCR fallback ──

pub struct LocalOcrStrategy {
    engine: Option<Arc<dyn LocalOcrEngine>>,
}

impl LocalOcrStrategy {
    pub fn new(engine: Option<Arc<dyn LocalOcrEngine>>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ExtractionStrategy for LocalOcrStrategy {
    fn name(&self) -> &'static str {
        "local_ocr"
    }

    fn availability(&self, file: &FileExtraction<'_>) -> Availability {
        if !file.settings.allow_local_ocr_fallback {
            Availability::Skipped("local OCR fallback disabled".to_string())
        } else if self.engine.is_none() {
            Availability::Skipped("local OCR engine unavailable".to_string())
        } else {
            Availability::Available
        }
    }

    async fn extract(&self, file: &FileExtraction<'_>) -> Result<ExtractionResult, ImportError> {
        let Some(engine) = self.engine.as_ref() else {
            return Ok(ExtractionResult::failed("local OCR engine unavailable"));
        };

        let rendered = match file.pages().await {
            Ok(rendered) => rendered,
            Err(e) => return Ok(ExtractionResult::failed(e)),
        };

        let total_pages = rendered.pages.len() as u32;
        let mut texts = Vec::with_capacity(rendered.pages.len());
        let mut failures = Vec::new();

        for (i, page) in rendered.pages.iter().enumerate() {
            file.deadline.check(&format!(
                "reading page {} of {}",
                page.page, file.doc.name
            ))?;
            file.report(
                i as f64 / f64::from(total_pages.max(1)),
                format!(
                    "Reading page {} of {} in {}",
                    page.page, total_pages, file.doc.name
                ),
                Some((page.page, total_pages)),
            );

            let engine = Arc::clone(engine);
            let png = page.png.clone();
            match tokio::task::spawn_blocking(move || engine.recognize(&png)).await {
                Ok(Ok(text)) => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        texts.push(trimmed.to_string());
                    }
                }
                Ok(Err(e)) => failures.push(format!("page {}: {}", page.page, e)),
                Err(e) => failures.push(format!("page {}: OCR task failed: {}", page.page, e)),
            }
        }

        if !failures.is_empty() {
            tracing::warn!(
                file = %file.doc.name,
                failed_pages = failures.len(),
                total_pages = total_pages,
                "Local OCR failed on some pages"
            );
        }

        if total_pages > 0 && failures.len() == total_pages as usize {
            return Ok(ExtractionResult::failed(format!(
                "all {} page(s) failed ({})",
                total_pages, failures[0]
            )));
        }

        Ok(ExtractionResult::ok(texts.join(PAGE_BREAK)))
    }
}
