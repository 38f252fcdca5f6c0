//! Scheduled publish runner.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use quota_gate_core::ScheduledPost;
use quota_gate_store::{Store, StoreError};

use super::facebook::{PublishError, SocialPublisher};

/// Summary of one publish run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Due posts picked up.
    pub due: usize,
    /// Posts moved to `published`.
    pub published: usize,
    /// Posts moved to `failed`.
    pub failed: usize,
    /// Posts whose outcome could not be recorded; they stay pending.
    pub errors: usize,
}

enum PostOutcome {
    Published,
    Failed,
    NotRecorded,
}

/// Publishes due posts and records a terminal status for each.
pub struct PublishRunner {
    store: Arc<dyn Store>,
    publisher: Arc<dyn SocialPublisher>,
    batch_size: usize,
    concurrency: usize,
    timeout: Duration,
    run_lock: tokio::sync::Mutex<()>,
}

impl PublishRunner {
    /// Create a runner.
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn SocialPublisher>,
        batch_size: usize,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            batch_size,
            concurrency: concurrency.max(1),
            timeout,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Publish every post due at `now` (epoch seconds).
    ///
    /// Runs never overlap. Each post is handled independently: a failing
    /// publish or a failed status write affects only that post.
    ///
    /// # Errors
    ///
    /// Returns an error only if the due posts cannot be listed.
    pub async fn run_once(&self, now: i64) -> Result<RunReport, StoreError> {
        let _run = self.run_lock.lock().await;

        let posts = self.store.list_due_posts(now, self.batch_size)?;
        let mut report = RunReport {
            due: posts.len(),
            ..RunReport::default()
        };
        if posts.is_empty() {
            return Ok(report);
        }

        tracing::info!(due = report.due, now, "Publishing due posts");

        let mut outcomes = stream::iter(posts)
            .map(|post| self.publish_one(post))
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                PostOutcome::Published => report.published += 1,
                PostOutcome::Failed => report.failed += 1,
                PostOutcome::NotRecorded => report.errors += 1,
            }
        }

        tracing::info!(
            due = report.due,
            published = report.published,
            failed = report.failed,
            errors = report.errors,
            "Publish run finished"
        );

        Ok(report)
    }

    async fn publish_one(&self, mut post: ScheduledPost) -> PostOutcome {
        let result = tokio::time::timeout(self.timeout, self.publisher.publish(&post))
            .await
            .unwrap_or(Err(PublishError::Timeout(self.timeout)));

        let (transition, outcome) = match result {
            Ok(external_id) => {
                tracing::info!(post_id = %post.id, external_id = %external_id, "Post published");
                (post.mark_published(external_id), PostOutcome::Published)
            }
            Err(e) => {
                tracing::warn!(post_id = %post.id, page_id = %post.facebook_page_id, error = %e, "Post failed");
                (post.mark_failed(e.to_string()), PostOutcome::Failed)
            }
        };

        if let Err(e) = transition {
            tracing::error!(post_id = %post.id, error = %e, "Due post was not pending");
            return PostOutcome::NotRecorded;
        }

        // A published post left pending here is published again on the next
        // run; the external id in this event is what reconciles it.
        if let Err(e) = self.store.finish_post(&post) {
            tracing::error!(
                post_id = %post.id,
                status = %post.status,
                external_id = ?post.external_id,
                error = %e,
                "Failed to record post status"
            );
            return PostOutcome::NotRecorded;
        }

        outcome
    }
}

/// Spawn the in-process publish loop, running every `interval`.
pub fn spawn_publish_loop(runner: Arc<PublishRunner>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_seconds = interval.as_secs(), "Publish loop started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp();
            match runner.run_once(now).await {
                Ok(report) if report.due > 0 => {
                    tracing::debug!(?report, "Publish loop tick");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Publish run failed to list due posts"),
            }
        }
    })
}
