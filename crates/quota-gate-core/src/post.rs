//! Scheduled post types.
//!
//! A post is created `pending` and moves exactly once, to `published` or
//! `failed`. Failed posts are never retried in place; an operator re-enqueues
//! them as a new post via [`ScheduledPost::requeue`], at most once per failed
//! post.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::PostId;

/// Lifecycle status of a scheduled post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    /// Waiting for its scheduled time.
    Pending,
    /// Accepted by the platform.
    Published,
    /// Publish attempt failed; terminal.
    Failed,
}

impl PostStatus {
    /// Status name as stored and returned over the API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A social-media post queued for publication.
#[derive(Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    /// Post ID.
    pub id: PostId,

    /// Lifecycle status.
    pub status: PostStatus,

    /// When the post becomes due (epoch seconds).
    pub scheduled_time: i64,

    /// Public URL of the media to attach.
    pub media_url: String,

    /// Caption text.
    pub content: String,

    /// Target Facebook page.
    pub facebook_page_id: String,

    /// Page access token used for this post.
    pub facebook_token: String,

    /// Failure detail for `failed` posts.
    pub error_log: Option<String>,

    /// Platform object ID for `published` posts.
    pub external_id: Option<String>,

    /// The failed post this one was re-enqueued from.
    pub requeued_from: Option<PostId>,

    /// The post that replaced this one after a failure.
    #[serde(default)]
    pub requeued_to: Option<PostId>,

    /// When the post was created.
    pub created_at: DateTime<Utc>,

    /// When the post was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ScheduledPost {
    /// Create a new pending post.
    #[must_use]
    pub fn new(
        scheduled_time: i64,
        media_url: String,
        content: String,
        facebook_page_id: String,
        facebook_token: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PostId::generate(),
            status: PostStatus::Pending,
            scheduled_time,
            media_url,
            content,
            facebook_page_id,
            facebook_token,
            error_log: None,
            external_id: None,
            requeued_from: None,
            requeued_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the post is pending and its scheduled time has passed.
    #[must_use]
    pub fn is_due(&self, now: i64) -> bool {
        self.status == PostStatus::Pending && self.scheduled_time <= now
    }

    /// Transition to `published`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidTransition`] unless the post is pending.
    pub fn mark_published(&mut self, external_id: String) -> Result<()> {
        self.transition(PostStatus::Published)?;
        self.external_id = Some(external_id);
        Ok(())
    }

    /// Transition to `failed`, keeping the error detail.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidTransition`] unless the post is pending.
    pub fn mark_failed(&mut self, error: String) -> Result<()> {
        self.transition(PostStatus::Failed)?;
        self.error_log = Some(error);
        Ok(())
    }

    /// Build a fresh pending copy of a failed post and link the two.
    ///
    /// The failed post keeps its status but records the replacement, so a
    /// second call is refused.
    ///
    /// # Errors
    ///
    /// - [`BillingError::InvalidTransition`] unless the post has failed.
    /// - [`BillingError::AlreadyRequeued`] if a replacement already exists.
    pub fn requeue(&mut self, scheduled_time: Option<i64>) -> Result<Self> {
        if self.status != PostStatus::Failed {
            return Err(BillingError::InvalidTransition {
                from: self.status,
                to: PostStatus::Pending,
            });
        }
        if let Some(requeued_to) = self.requeued_to {
            return Err(BillingError::AlreadyRequeued {
                post_id: self.id,
                requeued_to,
            });
        }
        let mut post = Self::new(
            scheduled_time.unwrap_or(self.scheduled_time),
            self.media_url.clone(),
            self.content.clone(),
            self.facebook_page_id.clone(),
            self.facebook_token.clone(),
        );
        post.requeued_from = Some(self.id);
        self.requeued_to = Some(post.id);
        self.updated_at = post.created_at;
        Ok(post)
    }

    fn transition(&mut self, to: PostStatus) -> Result<()> {
        if self.status != PostStatus::Pending {
            return Err(BillingError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl std::fmt::Debug for ScheduledPost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledPost")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("scheduled_time", &self.scheduled_time)
            .field("facebook_page_id", &self.facebook_page_id)
            .field("error_log", &self.error_log)
            .field("requeued_to", &self.requeued_to)
            .finish_non_exhaustive()
    }
}
