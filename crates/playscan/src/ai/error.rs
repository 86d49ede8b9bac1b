use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("Remote AI request timed out after {0} ms")]
    Timeout(u64),

    #[error("Remote AI request failed: {0}")]
    Http(String),

    #[error("Remote AI returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Remote AI rate limit persisted after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Remote AI returned an empty response")]
    EmptyResponse,

    #[error("Failed to decode remote AI response: {0}")]
    Decode(String),
}

impl AiError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AiError::Timeout(_))
    }
}
