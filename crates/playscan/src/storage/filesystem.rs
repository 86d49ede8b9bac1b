use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::scene::ParsedScene;

use super::{validate_owner_path, BlobStore, SceneSink};

/// Blob store backed by a local directory; `owner/file.pdf` maps to
/// `<root>/owner/file.pdf`.
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        // Keys are owner-scoped; anything else never reaches the filesystem.
        let owner = path.split('/').next().unwrap_or_default();
        validate_owner_path(owner, path)?;

        let full = self.root.join(path);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(StorageError::ReadFile {
                path: full,
                source: e,
            }),
        }
    }
}

/// Scene sink writing one pretty-printed JSON file per scene under
/// `<directory>/<owner>/`. The file stem is the scene id.
pub struct JsonDirectorySink {
    directory: PathBuf,
}

impl JsonDirectorySink {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    fn store(&self, owner_id: &str, slug: &str, content: &[u8]) -> Result<PathBuf, StorageError> {
        let dir_path = self.directory.join(owner_id);
        if !dir_path.exists() {
            std::fs::create_dir_all(&dir_path).map_err(|e| StorageError::CreateDirectory {
                path: dir_path.clone(),
                source: e,
            })?;
        }

        for counter in 1..=1000 {
            let filename = if counter == 1 {
                format!("{}.json", slug)
            } else {
                format!("{}_{}.json", slug, counter)
            };
            let try_path = dir_path.join(&filename);

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&try_path)
            {
                Ok(mut file) => {
                    file.write_all(content)
                        .map_err(|e| StorageError::WriteFile {
                            path: try_path.clone(),
                            source: e,
                        })?;
                    return Ok(try_path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: try_path,
                        source: e,
                    })
                }
            }
        }

        Err(StorageError::FileExists(dir_path.join(format!("{}.json", slug))))
    }
}

#[async_trait]
impl SceneSink for JsonDirectorySink {
    async fn commit(&self, owner_id: &str, scene: &ParsedScene) -> Result<String, StorageError> {
        let content = serde_json::to_vec_pretty(scene)?;
        let path = self.store(owner_id, &slugify(&scene.title), &content)?;
        let scene_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("scene")
            .to_string();
        log::info!(
            "Committed scene '{}' for owner {}",
            scene_id,
            crate::sanitize::hash_id(owner_id)
        );
        Ok(scene_id)
    }
}

/// Lowercase ASCII slug of a title, `scene` when nothing usable remains.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "scene".to_string()
    } else {
        slug.chars().take(64).collect()
    }
}
