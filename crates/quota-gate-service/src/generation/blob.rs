//! Artifact blob storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::provider::GenerationError;

/// Durable storage for generated artifacts.
///
/// Keys are write-once: storing the same key twice is an error.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return the artifact's public reference.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str)
        -> Result<String, GenerationError>;
}

/// Blob store backed by a local directory.
///
/// Files are served back by the HTTP layer under `/artifacts`, so the public
/// reference is `{public_base_url}/artifacts/{key}`. The content type is
/// carried by the key's extension.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    /// Create a blob store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Removes a partially written file unless the write completed.
///
/// Runs on error returns and when the write future is cancelled.
struct PartialFile<'a> {
    path: Option<&'a Path>,
}

impl PartialFile<'_> {
    fn complete(mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial artifact");
            }
        }
    }
}

fn validate_key(key: &str) -> Result<(), GenerationError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(GenerationError::Storage(format!("invalid blob key: {key:?}")))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, GenerationError> {
        validate_key(key)?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| GenerationError::Storage(format!("create {}: {e}", self.root.display())))?;

        let path = self.root.join(key);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| GenerationError::Storage(format!("open {}: {e}", path.display())))?;
        let partial = PartialFile { path: Some(&path) };

        file.write_all(bytes)
            .await
            .map_err(|e| GenerationError::Storage(format!("write {}: {e}", path.display())))?;
        file.sync_all()
            .await
            .map_err(|e| GenerationError::Storage(format!("sync {}: {e}", path.display())))?;
        partial.complete();

        tracing::debug!(key = %key, content_type = %content_type, size_bytes = bytes.len(), "Stored artifact");

        Ok(format!("{}/artifacts/{key}", self.public_base_url))
    }
}
