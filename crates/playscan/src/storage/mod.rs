//! Blob access and scene commit boundaries.

pub mod filesystem;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::scene::ParsedScene;

pub use filesystem::{FilesystemBlobStore, JsonDirectorySink};

/// Read-only access to uploaded files keyed by `owner/…` paths.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, StorageError>;
}

/// Permanent storage for committed scenes. Returns the new scene id.
#[async_trait]
pub trait SceneSink: Send + Sync {
    async fn commit(&self, owner_id: &str, scene: &ParsedScene) -> Result<String, StorageError>;
}

/// Checks that `path` lives inside `owner_id`'s namespace.
///
/// The path must start with `owner_id/` and may not contain empty, `.` or
/// `..` segments or backslashes.
pub fn validate_owner_path(owner_id: &str, path: &str) -> Result<(), StorageError> {
    let outside = || StorageError::OutsideNamespace {
        path: path.to_string(),
    };

    if owner_id.is_empty() || owner_id.contains('/') || owner_id.contains('\\') {
        return Err(outside());
    }
    let rest = path
        .strip_prefix(owner_id)
        .and_then(|r| r.strip_prefix('/'))
        .ok_or_else(outside)?;
    if rest.is_empty() || path.contains('\\') || path.contains('\0') {
        return Err(outside());
    }
    if rest
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(outside());
    }
    Ok(())
}
