//! Generation handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use quota_gate_core::FundingMode;

use super::parse_user_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Generation request.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Requesting user.
    #[serde(alias = "userId")]
    pub user_id: String,
    /// Prompt text.
    pub prompt: String,
}

/// Generation response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    /// Public reference of the stored artifact.
    pub artifact_ref: String,
    /// Funding mode that paid for the generation.
    pub mode: FundingMode,
}

/// Generate one artifact, funded by trial, credits or the user's own key.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;

    let outcome = state.dispatcher.dispatch(&user_id, &body.prompt).await?;

    Ok(Json(GenerateResponse {
        artifact_ref: outcome.artifact_ref,
        mode: outcome.mode,
    }))
}
