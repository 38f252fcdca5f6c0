//! Generation provider client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

/// Characters of an error body kept in error messages.
const ERROR_BODY_PREVIEW_CHARS: usize = 512;

/// Content type assumed when the provider does not send one.
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Error type for generation.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with an error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Artifact could not be stored.
    #[error("storage error: {0}")]
    Storage(String),

    /// Provider call plus storage exceeded the time budget.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Raw output of a provider call.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// Image bytes.
    pub bytes: Vec<u8>,
    /// MIME type reported by the provider.
    pub content_type: String,
}

/// A content generation backend.
///
/// Implementations make exactly one round trip per call and never retry.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate one image for `prompt`, authenticating with `api_key` when set.
    async fn generate(
        &self,
        prompt: &str,
        api_key: Option<&str>,
    ) -> Result<GeneratedImage, GenerationError>;
}

/// Image provider reached over plain HTTP.
///
/// Issues `GET {base_url}/prompt/{prompt}` and returns the response body.
/// A credential, when present, is sent as a bearer token.
#[derive(Debug, Clone)]
pub struct HttpImageProvider {
    client: Client,
    base_url: Url,
}

impl HttpImageProvider {
    /// Create a new provider client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GenerationError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GenerationError::Configuration(format!("invalid base URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GenerationError::Configuration(format!(
                "base URL cannot carry a path: {base_url}"
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    /// Build the request URL for a prompt; the prompt is percent-encoded as one segment.
    fn prompt_url(&self, prompt: &str) -> Result<Url, GenerationError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GenerationError::Configuration("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .push("prompt")
            .push(prompt);
        Ok(url)
    }
}

#[async_trait]
impl GenerationProvider for HttpImageProvider {
    async fn generate(
        &self,
        prompt: &str,
        api_key: Option<&str>,
    ) -> Result<GeneratedImage, GenerationError> {
        let url = self.prompt_url(prompt)?;

        let mut request = self.client.get(url);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
            return Err(GenerationError::Provider(format!("HTTP {status}: {preview}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(GenerationError::Provider("empty response body".into()));
        }

        tracing::debug!(
            content_type = %content_type,
            size_bytes = bytes.len(),
            byok = api_key.is_some(),
            "Provider returned image"
        );

        Ok(GeneratedImage {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> HttpImageProvider {
        HttpImageProvider::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn prompt_is_encoded_as_single_segment() {
        let provider =
            HttpImageProvider::new("https://images.example.com/", Duration::from_secs(1)).unwrap();
        let url = provider.prompt_url("a cat / on a mat?").unwrap();
        assert_eq!(
            url.as_str(),
            "https://images.example.com/prompt/a%20cat%20%2F%20on%20a%20mat%3F"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            HttpImageProvider::new("not a url", Duration::from_secs(1)),
            Err(GenerationError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn returns_bytes_and_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prompt/sunset"))
            .and(header("authorization", "Bearer user-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;

        let image = provider(&server)
            .generate("sunset", Some("user-key"))
            .await
            .unwrap();
        assert_eq!(image.bytes, vec![1, 2, 3]);
        assert_eq!(image.content_type, "image/png");
    }

    #[tokio::test]
    async fn provider_error_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = provider(&server).generate("x", None).await.unwrap_err();
        match err {
            GenerationError::Provider(msg) => assert!(msg.contains("overloaded")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
