//! Scheduled post handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use quota_gate_core::{PostId, PostStatus, ScheduledPost};
use quota_gate_store::Store;

use crate::error::ApiError;
use crate::publish::RunReport;
use crate::state::AppState;

/// Create post request.
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    /// When to publish (epoch seconds).
    pub scheduled_time: i64,
    /// Public URL of the media.
    pub media_url: String,
    /// Caption.
    #[serde(default)]
    pub content: String,
    /// Target page.
    pub facebook_page_id: String,
    /// Page access token.
    pub facebook_token: String,
}

/// Requeue request; every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct RequeueRequest {
    /// New publication time; defaults to the failed post's time.
    pub scheduled_time: Option<i64>,
}

/// Post response. The page token is never included.
#[derive(Debug, Serialize)]
pub struct PostResponse {
    /// Post ID.
    pub id: String,
    /// Lifecycle status.
    pub status: PostStatus,
    /// Publication time (epoch seconds).
    pub scheduled_time: i64,
    /// Media URL.
    pub media_url: String,
    /// Caption.
    pub content: String,
    /// Target page.
    pub facebook_page_id: String,
    /// Failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log: Option<String>,
    /// Platform ID once published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// The failed post this one replaces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requeued_from: Option<String>,
    /// The post that replaced this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requeued_to: Option<String>,
    /// Created timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

impl From<&ScheduledPost> for PostResponse {
    fn from(post: &ScheduledPost) -> Self {
        Self {
            id: post.id.to_string(),
            status: post.status,
            scheduled_time: post.scheduled_time,
            media_url: post.media_url.clone(),
            content: post.content.clone(),
            facebook_page_id: post.facebook_page_id.clone(),
            error_log: post.error_log.clone(),
            external_id: post.external_id.clone(),
            requeued_from: post.requeued_from.map(|id| id.to_string()),
            requeued_to: post.requeued_to.map(|id| id.to_string()),
            created_at: post.created_at.to_rfc3339(),
            updated_at: post.updated_at.to_rfc3339(),
        }
    }
}

fn parse_post_id(raw: &str) -> Result<PostId, ApiError> {
    raw.parse::<PostId>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Schedule a new post.
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    for (name, value) in [
        ("media_url", &body.media_url),
        ("facebook_page_id", &body.facebook_page_id),
        ("facebook_token", &body.facebook_token),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::BadRequest(format!("{name} must not be empty")));
        }
    }

    let post = ScheduledPost::new(
        body.scheduled_time,
        body.media_url,
        body.content,
        body.facebook_page_id,
        body.facebook_token,
    );
    state.store.insert_post(&post)?;

    tracing::info!(
        post_id = %post.id,
        scheduled_time = post.scheduled_time,
        "Post scheduled"
    );

    Ok((StatusCode::CREATED, Json(PostResponse::from(&post))))
}

/// Get a post.
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
) -> Result<Json<PostResponse>, ApiError> {
    let post_id = parse_post_id(&post_id)?;

    let post = state
        .store
        .get_post(&post_id)?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;

    Ok(Json(PostResponse::from(&post)))
}

/// Re-enqueue a failed post as a new pending post, at most once.
pub async fn requeue_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let post_id = parse_post_id(&post_id)?;
    let request: RequeueRequest = if body.is_empty() {
        RequeueRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let post = state.store.requeue_post(&post_id, request.scheduled_time)?;

    tracing::info!(
        post_id = %post.id,
        requeued_from = %post_id,
        scheduled_time = post.scheduled_time,
        "Failed post re-enqueued"
    );

    Ok((StatusCode::CREATED, Json(PostResponse::from(&post))))
}

/// Publish every due post now.
pub async fn run_publish(State(state): State<Arc<AppState>>) -> Result<Json<RunReport>, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let report = state.runner.run_once(now).await?;
    Ok(Json(report))
}
