use std::sync::Arc;

use crate::error::ProcessError;

/// CPU-bound OCR over a single PNG page.
pub trait LocalOcrEngine: Send + Sync {
    fn recognize(&self, png: &[u8]) -> Result<String, ProcessError>;

    /// Whether the engine can run at all on this host.
    fn is_available(&self) -> bool {
        true
    }
}

/// Tesseract through `leptess`. A fresh instance is created per page since
/// `LepTess` is not `Sync`.
#[derive(Clone)]
pub struct TesseractEngine {
    inner: Arc<TesseractInner>,
}

struct TesseractInner {
    languages: String,
}

impl TesseractEngine {
    pub fn new(languages: &[String]) -> Self {
        let lang_str = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        Self {
            inner: Arc::new(TesseractInner {
                languages: lang_str,
            }),
        }
    }

    pub fn languages(&self) -> &str {
        &self.inner.languages
    }
}

impl LocalOcrEngine for TesseractEngine {
    fn recognize(&self, png: &[u8]) -> Result<String, ProcessError> {
        let _span =
            tracing::info_span!("processor.ocr", languages = %self.inner.languages).entered();

        if png.is_empty() {
            return Err(ProcessError::OcrFailed("Empty page image".to_string()));
        }

        let mut lt = leptess::LepTess::new(None, &self.inner.languages).map_err(|e| {
            ProcessError::OcrFailed(format!("Failed to initialize Tesseract: {}", e))
        })?;

        lt.set_image_from_mem(png)
            .map_err(|e| ProcessError::OcrFailed(format!("Failed to set image for OCR: {}", e)))?;

        lt.get_utf8_text()
            .map_err(|e| ProcessError::OcrFailed(format!("OCR failed: {}", e)))
    }

    fn is_available(&self) -> bool {
        leptess::LepTess::new(None, &self.inner.languages).is_ok()
    }
}
