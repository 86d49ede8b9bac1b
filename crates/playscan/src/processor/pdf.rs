use crate::error::ProcessError;

/// Separator placed between the text of consecutive pages.
pub const PAGE_BREAK: &str = "\n\n";

/// Embedded text of a PDF.
#[derive(Debug, Clone, Default)]
pub struct NativeText {
    pub text: String,
    pub page_count: u32,
}

impl NativeText {
    /// Whether the text is worth keeping instead of running OCR.
    pub fn is_usable(&self) -> bool {
        is_usable_text(&self.text)
    }
}

/// Reads the text layer of a PDF without rendering anything.
///
/// Pages whose text cannot be decoded are skipped. A document lopdf cannot
/// parse at all is an error; the renderer may still handle it.
pub fn extract_native_text(pdf_bytes: &[u8]) -> Result<NativeText, ProcessError> {
    let _span = tracing::info_span!("processor.pdf_text").entered();

    let doc = lopdf::Document::load_mem(pdf_bytes)
        .map_err(|e| ProcessError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

    let pages = doc.get_pages();
    let mut page_texts = Vec::with_capacity(pages.len());
    for (page_num, _) in pages.iter() {
        match doc.extract_text(&[*page_num]) {
            Ok(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    page_texts.push(trimmed.to_string());
                }
            }
            Err(e) => tracing::debug!(page = page_num, error = %e, "No text layer on page"),
        }
    }

    Ok(NativeText {
        text: page_texts.join(PAGE_BREAK),
        page_count: pages.len() as u32,
    })
}

/// Marker lopdf emits for CID fonts it cannot decode.
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Below this many characters the alphanumeric ratio is not checked.
const MIN_TOTAL_CHARS: usize = 50;

/// Text with a lower share of alphanumeric characters is treated as garbled.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// Rejects empty text, pure font-decoding markers and mostly-symbol output.
pub fn is_usable_text(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");
    if cleaned.is_empty() {
        return false;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();
    !(total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT)
}
