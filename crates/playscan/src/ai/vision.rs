use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use super::client::{CompletionBackend, CompletionRequest, ContentPart};
use super::error::AiError;
use crate::processor::PageImage;

const VISION_PROMPT: &str = "The following images are consecutive pages of a scanned \
theatrical script. Transcribe all text exactly as printed, page by page, in reading order. \
Keep speaker names, stage directions and line breaks. Separate pages with a blank line. \
Return only the transcription, with no commentary. If a page has no legible text, return \
nothing for it.";

/// Transcribes every page of one file in a single remote call.
#[async_trait]
pub trait VisionOcr: Send + Sync {
    async fn transcribe(&self, file_name: &str, pages: &[PageImage]) -> Result<String, AiError>;
}

pub struct RemoteVisionOcr {
    backend: Arc<dyn CompletionBackend>,
    model: String,
}

impl RemoteVisionOcr {
    pub fn new(backend: Arc<dyn CompletionBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }
}

#[async_trait]
impl VisionOcr for RemoteVisionOcr {
    async fn transcribe(&self, file_name: &str, pages: &[PageImage]) -> Result<String, AiError> {
        let mut parts = Vec::with_capacity(pages.len() + 1);
        parts.push(ContentPart::Text(VISION_PROMPT.to_string()));
        parts.extend(pages.iter().map(|p| ContentPart::PngImage(p.png.clone())));

        let text = self
            .backend
            .complete(CompletionRequest {
                model: self.model.clone(),
                system: None,
                parts,
                json_response: false,
            })
            .instrument(tracing::info_span!("ai.vision", file = %file_name, pages = pages.len()))
            .await?;

        Ok(text.trim().to_string())
    }
}
