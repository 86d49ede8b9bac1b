pub mod ocr;
pub mod pdf;
pub mod render;

use crate::error::ProcessError;
use crate::sanitize::redact_blob_path;

pub use ocr::{LocalOcrEngine, TesseractEngine};
pub use render::{PageRenderer, PopplerRenderer};

/// Formats accepted for import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Image,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Image => "image",
        }
    }
}

/// A downloaded file that passed type and size checks.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Blob key the bytes were read from.
    pub path: String,
    /// File name only, safe for logs and progress events.
    pub name: String,
    pub kind: FileKind,
    pub bytes: Vec<u8>,
}

/// A rasterized page, PNG-encoded. Pages are numbered from 1.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page: u32,
    pub png: Vec<u8>,
}

/// Validates size and type of a downloaded file.
pub fn prepare_document(
    path: &str,
    bytes: Vec<u8>,
    max_size_bytes: u64,
) -> Result<SourceDocument, ProcessError> {
    let name = redact_blob_path(path);

    if bytes.is_empty() {
        return Err(ProcessError::Empty(name));
    }
    let size = bytes.len() as u64;
    if size > max_size_bytes {
        return Err(ProcessError::TooLarge {
            name,
            size,
            limit: max_size_bytes,
        });
    }

    let kind = detect_kind(&name, &bytes)?;
    Ok(SourceDocument {
        path: path.to_string(),
        name,
        kind,
        bytes,
    })
}

/// Content sniffing wins; the extension only has to not contradict it.
///
/// A `.pdf` whose bytes are a PNG is rejected, while an extensionless upload
/// with PDF magic bytes is accepted.
pub fn detect_kind(name: &str, bytes: &[u8]) -> Result<FileKind, ProcessError> {
    let sniffed = if is_pdf_magic(bytes) {
        Some(FileKind::Pdf)
    } else if image::guess_format(bytes).is_ok() {
        Some(FileKind::Image)
    } else {
        None
    };

    let declared = mime_guess::from_path(name).first().and_then(|mime| {
        match (mime.type_().as_str(), mime.subtype().as_str()) {
            ("application", "pdf") => Some(FileKind::Pdf),
            ("image", _) => Some(FileKind::Image),
            _ => None,
        }
    });
    let has_extension = std::path::Path::new(name).extension().is_some();

    match (sniffed, declared) {
        (Some(kind), Some(declared)) if kind == declared => Ok(kind),
        (Some(kind), None) if !has_extension => Ok(kind),
        (Some(kind), _) => Err(ProcessError::UnsupportedFormat(format!(
            "'{}' contains {} data that does not match its extension",
            name,
            kind.as_str()
        ))),
        (None, _) => Err(ProcessError::UnsupportedFormat(format!(
            "'{}' is neither a PDF nor a supported image",
            name
        ))),
    }
}

fn is_pdf_magic(bytes: &[u8]) -> bool {
    // Some producers prepend junk before the header; the format allows 1024 bytes.
    let window = &bytes[..bytes.len().min(1024)];
    window.windows(5).any(|w| w == b"%PDF-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([255, 255, 255]));
        let mut out = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_detect_pdf_and_image() {
        assert_eq!(detect_kind("a.pdf", b"%PDF-1.5\n...").unwrap(), FileKind::Pdf);
        assert_eq!(detect_kind("page.png", &png_bytes()).unwrap(), FileKind::Image);
        assert_eq!(detect_kind("upload", b"%PDF-1.7").unwrap(), FileKind::Pdf);
    }

    #[test]
    fn test_mismatched_extension_rejected() {
        let result = detect_kind("script.pdf", &png_bytes());
        assert!(matches!(result, Err(ProcessError::UnsupportedFormat(_))));

        let result = detect_kind("notes.txt", b"%PDF-1.5");
        assert!(matches!(result, Err(ProcessError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_unknown_content_rejected() {
        let result = detect_kind("script.docx", b"PK\x03\x04 zip data");
        assert!(matches!(result, Err(ProcessError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_prepare_enforces_size_limit() {
        let result = prepare_document("u1/big.pdf", b"%PDF-1.5 padding".to_vec(), 8);
        match result {
            Err(ProcessError::TooLarge { name, size, limit }) => {
                assert_eq!(name, "big.pdf");
                assert_eq!(size, 16);
                assert_eq!(limit, 8);
            }
            other => panic!("Expected TooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_prepare_rejects_empty() {
        let result = prepare_document("u1/empty.pdf", Vec::new(), 1024);
        assert!(matches!(result, Err(ProcessError::Empty(_))));
    }

    #[test]
    fn test_prepare_keeps_only_file_name() {
        let doc = prepare_document("u1/uploads/act1.pdf", b"%PDF-1.5".to_vec(), 1024).unwrap();
        assert_eq!(doc.name, "act1.pdf");
        assert_eq!(doc.path, "u1/uploads/act1.pdf");
        assert_eq!(doc.kind, FileKind::Pdf);
    }
}
