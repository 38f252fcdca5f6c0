//! Graph API photo publisher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;

use quota_gate_core::ScheduledPost;

/// Characters of an error body kept in error messages.
const ERROR_BODY_PREVIEW_CHARS: usize = 512;

/// Error type for publishing.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform rejected the post.
    #[error("platform error ({status}): {message}")]
    Platform {
        /// HTTP status code.
        status: u16,
        /// Error message from the platform.
        message: String,
    },

    /// The platform answered without a post identifier.
    #[error("response has no id: {0}")]
    MissingId(String),

    /// The publish call exceeded its time budget.
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// A social platform that can publish a scheduled post.
#[async_trait]
pub trait SocialPublisher: Send + Sync {
    /// Publish the post's media and caption with its own page token.
    ///
    /// Returns the platform's identifier for the published item.
    async fn publish(&self, post: &ScheduledPost) -> Result<String, PublishError>;
}

/// Publishes photos to a Facebook page through the Graph API.
#[derive(Debug, Clone)]
pub struct FacebookPublisher {
    client: Client,
    graph_url: Url,
}

impl FacebookPublisher {
    /// Create a new publisher.
    ///
    /// # Errors
    ///
    /// Returns an error if the Graph URL is invalid or the HTTP client cannot be built.
    pub fn new(graph_url: &str, timeout: Duration) -> Result<Self, PublishError> {
        let graph_url = Url::parse(graph_url)
            .map_err(|e| PublishError::Configuration(format!("invalid Graph API URL: {e}")))?;
        if graph_url.cannot_be_a_base() {
            return Err(PublishError::Configuration(format!(
                "Graph API URL cannot carry a path: {graph_url}"
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, graph_url })
    }

    fn photos_url(&self, page_id: &str) -> Result<Url, PublishError> {
        let mut url = self.graph_url.clone();
        url.path_segments_mut()
            .map_err(|()| PublishError::Configuration("Graph API URL cannot carry a path".into()))?
            .pop_if_empty()
            .push(page_id)
            .push("photos");
        Ok(url)
    }
}

#[async_trait]
impl SocialPublisher for FacebookPublisher {
    async fn publish(&self, post: &ScheduledPost) -> Result<String, PublishError> {
        let url = self.photos_url(&post.facebook_page_id)?;

        let response = self
            .client
            .post(url)
            .form(&[
                ("url", post.media_url.as_str()),
                ("caption", post.content.as_str()),
                ("access_token", post.facebook_token.as_str()),
                ("published", "true"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: Option<Value> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let message = parsed
                .as_ref()
                .and_then(|v| v.pointer("/error/message"))
                .and_then(Value::as_str)
                .map_or_else(
                    || body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect(),
                    String::from,
                );
            return Err(PublishError::Platform {
                status: status.as_u16(),
                message,
            });
        }

        let id = parsed.as_ref().and_then(|v| match v.get("id") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });

        id.ok_or_else(|| PublishError::MissingId(body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect()))
    }
}
