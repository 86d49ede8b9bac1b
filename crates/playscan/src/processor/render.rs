use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ProcessError;
use crate::processor::{FileKind, PageImage, SourceDocument};

/// Pages of one document, capped at the configured maximum.
#[derive(Debug, Clone)]
pub struct RenderedPages {
    pub pages: Vec<PageImage>,
    /// Page count of the source document before capping.
    pub total_pages: u32,
}

/// Rasterizes documents into PNG pages. Blocking; run off the async executor.
pub trait PageRenderer: Send + Sync {
    fn render(
        &self,
        doc: &SourceDocument,
        max_pages: u32,
        scale: f32,
    ) -> Result<RenderedPages, ProcessError>;
}

/// Renders PDFs with poppler-utils (`pdfinfo`, `pdftoppm`) and normalizes
/// raster uploads to PNG with the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct PopplerRenderer;

impl PopplerRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl PageRenderer for PopplerRenderer {
    fn render(
        &self,
        doc: &SourceDocument,
        max_pages: u32,
        scale: f32,
    ) -> Result<RenderedPages, ProcessError> {
        let _span = tracing::info_span!(
            "processor.render",
            kind = doc.kind.as_str(),
            max_pages = max_pages
        )
        .entered();

        match doc.kind {
            FileKind::Image => Ok(RenderedPages {
                pages: vec![PageImage {
                    page: 1,
                    png: normalize_image(&doc.bytes)?,
                }],
                total_pages: 1,
            }),
            FileKind::Pdf => render_pdf(&doc.bytes, max_pages, scale),
        }
    }
}

/// Decodes any supported raster format and re-encodes it as PNG.
pub fn normalize_image(bytes: &[u8]) -> Result<Vec<u8>, ProcessError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ProcessError::ImageProcessing(format!("Failed to load image: {}", e)))?;
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| ProcessError::ImageProcessing(format!("Failed to convert image: {}", e)))?;
    Ok(png)
}

/// pdftoppm resolution for a scale factor relative to 72 DPI.
pub fn dpi_for_scale(scale: f32) -> u32 {
    (72.0 * scale).round().max(36.0) as u32
}

/// Removes the scratch directory when dropped.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn create() -> Result<Self, ProcessError> {
        let path = std::env::temp_dir().join(format!("playscan_render_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)
            .map_err(|e| ProcessError::Render(format!("Failed to create temp dir: {}", e)))?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn render_pdf(pdf_bytes: &[u8], max_pages: u32, scale: f32) -> Result<RenderedPages, ProcessError> {
    let scratch = ScratchDir::create()?;
    let pdf_path = scratch.path().join("source.pdf");
    std::fs::write(&pdf_path, pdf_bytes)
        .map_err(|e| ProcessError::Render(format!("Failed to write temp PDF: {}", e)))?;

    let total_pages = count_pdf_pages(&pdf_path)?;
    let last_page = total_pages.min(max_pages.max(1));
    let prefix = scratch.path().join("page");

    let output = Command::new("pdftoppm")
        .arg("-png")
        .arg("-r")
        .arg(dpi_for_scale(scale).to_string())
        .arg("-f")
        .arg("1")
        .arg("-l")
        .arg(last_page.to_string())
        .arg(&pdf_path)
        .arg(&prefix)
        .output()
        .map_err(|e| {
            ProcessError::Render(format!(
                "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
                e
            ))
        })?;

    if !output.status.success() {
        return Err(ProcessError::Render(format!(
            "pdftoppm failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let mut pages = Vec::with_capacity(last_page as usize);
    for page in 1..=last_page {
        let image_path = find_page_output(&prefix, page).ok_or_else(|| {
            ProcessError::Render(format!("Rendered image for page {} is missing", page))
        })?;
        let png = std::fs::read(&image_path).map_err(|e| {
            ProcessError::Render(format!("Failed to read rendered page {}: {}", page, e))
        })?;
        pages.push(PageImage { page, png });
    }

    if last_page < total_pages {
        tracing::warn!(
            total_pages = total_pages,
            rendered = last_page,
            "Document exceeds page limit, remaining pages ignored"
        );
    }

    Ok(RenderedPages { pages, total_pages })
}

/// pdftoppm zero-pads the page suffix to the width of the last page number.
fn find_page_output(prefix: &Path, page: u32) -> Option<PathBuf> {
    let prefix = prefix.display();
    [
        format!("{}-{}.png", prefix, page),
        format!("{}-{:02}.png", prefix, page),
        format!("{}-{:03}.png", prefix, page),
    ]
    .into_iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

fn count_pdf_pages(pdf_path: &Path) -> Result<u32, ProcessError> {
    let output = Command::new("pdfinfo").arg(pdf_path).output().map_err(|e| {
        ProcessError::Render(format!(
            "Failed to run pdfinfo: {}. Make sure poppler-utils is installed.",
            e
        ))
    })?;

    if !output.status.success() {
        return Err(ProcessError::Render(format!(
            "pdfinfo failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(parse_page_count(&String::from_utf8_lossy(&output.stdout)).unwrap_or(1))
}

fn parse_page_count(pdfinfo_output: &str) -> Option<u32> {
    pdfinfo_output
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|count| count.trim().parse().ok())
}
