//! Remote AI services: vision OCR and scene structuring over an
//! OpenAI-compatible chat completions API.

pub mod client;
pub mod error;
pub mod local_structurer;
pub mod structurer;
pub mod vision;

pub use client::{AiClient, CompletionBackend, CompletionRequest, ContentPart};
pub use error::AiError;
pub use local_structurer::LocalStructurer;
pub use structurer::{parse_scene_response, AiStructurer, SceneStructurer};
pub use vision::{RemoteVisionOcr, VisionOcr};
