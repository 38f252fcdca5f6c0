//! Generation executor.

use std::sync::Arc;
use std::time::Duration;

use quota_gate_core::Entitlement;
use ulid::Ulid;

use super::blob::BlobStore;
use super::provider::{GenerationError, GenerationProvider};

/// A stored generation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Blob key (`gen-<ulid>.<ext>`).
    pub key: String,
    /// Public reference returned to callers and recorded in the ledger.
    pub public_ref: String,
    /// MIME type reported by the provider.
    pub content_type: String,
    /// Stored size.
    pub size_bytes: usize,
}

/// Runs one generation: provider call, then blob write.
///
/// The credential comes from the entitlement: BYOK generations use the
/// caller's key, TRIAL and CREDIT use the system key. Nothing is retried.
pub struct GenerationExecutor {
    provider: Arc<dyn GenerationProvider>,
    blobs: Arc<dyn BlobStore>,
    system_key: Option<String>,
    timeout: Duration,
}

impl GenerationExecutor {
    /// Create an executor.
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        blobs: Arc<dyn BlobStore>,
        system_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            blobs,
            system_key,
            timeout,
        }
    }

    /// Generate and store one artifact under the given entitlement.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails, the blob write fails, or the
    /// whole operation exceeds the timeout.
    pub async fn execute(
        &self,
        prompt: &str,
        entitlement: &Entitlement,
    ) -> Result<Artifact, GenerationError> {
        let api_key = entitlement.user_key().or(self.system_key.as_deref());

        tokio::time::timeout(self.timeout, self.run(prompt, api_key))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))?
    }

    async fn run(&self, prompt: &str, api_key: Option<&str>) -> Result<Artifact, GenerationError> {
        let image = self.provider.generate(prompt, api_key).await?;

        let key = artifact_key(&image.content_type);
        let public_ref = self
            .blobs
            .put(&key, &image.bytes, &image.content_type)
            .await?;

        Ok(Artifact {
            key,
            public_ref,
            content_type: image.content_type,
            size_bytes: image.bytes.len(),
        })
    }
}

/// Build a fresh, collision-free blob key for the given content type.
#[must_use]
pub fn artifact_key(content_type: &str) -> String {
    format!(
        "gen-{}.{}",
        Ulid::new().to_string().to_ascii_lowercase(),
        extension_for(content_type)
    )
}

fn extension_for(content_type: &str) -> &'static str {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    match mime.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}
