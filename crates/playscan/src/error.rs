use std::path::PathBuf;
use thiserror::Error;

use crate::job::ProcessingStage;

/// Classified failure of an import run.
///
/// Every variant maps to a stable [`ImportError::kind`] string that is persisted
/// on the job record and reported to streaming callers.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("{0}")]
    Validation(String),

    #[error("Failed to download '{path}': {reason}")]
    Download { path: String, reason: String },

    #[error("{0}")]
    Extraction(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Structuring(String),

    #[error("Failed to persist job state: {0}")]
    Persistence(#[from] crate::db::DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImportError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ImportError::Validation(_) => "validation",
            ImportError::Download { .. } => "download",
            ImportError::Extraction(_) => "extraction",
            ImportError::Timeout(_) => "timeout",
            ImportError::Structuring(_) => "structuring",
            ImportError::Persistence(_) => "persistence",
            ImportError::Internal(_) => "internal",
        }
    }
}

/// An [`ImportError`] tagged with the stage it was raised in.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: ProcessingStage,
    pub error: ImportError,
}

impl StageFailure {
    pub fn new(stage: ProcessingStage, error: ImportError) -> Self {
        Self { stage, error }
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnvOverride { name: String, value: String },

    #[error("Failed to resolve AI API key: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("File '{name}' is {size} bytes, exceeding the {limit} byte limit")]
    TooLarge { name: String, size: u64, limit: u64 },

    #[error("File '{0}' is empty")]
    Empty(String),

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),

    #[error("Failed to process image: {0}")]
    ImageProcessing(String),

    #[error("Failed to render pages: {0}")]
    Render(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Path '{path}' is outside the owner's namespace")]
    OutsideNamespace { path: String },

    #[error("Blob '{0}' not found")]
    NotFound(String),

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No free file name for '{0}'")]
    FileExists(PathBuf),

    #[error("Failed to serialize scene: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<ProcessError> for ImportError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::UnsupportedFormat(_)
            | ProcessError::TooLarge { .. }
            | ProcessError::Empty(_) => ImportError::Validation(err.to_string()),
            other => ImportError::Extraction(other.to_string()),
        }
    }
}

impl From<StorageError> for ImportError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OutsideNamespace { .. } => ImportError::Validation(err.to_string()),
            other => ImportError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
