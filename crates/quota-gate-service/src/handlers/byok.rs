//! Bring-your-own-key handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use quota_gate_store::Store;

use super::parse_user_id;
use crate::error::ApiError;
use crate::state::AppState;

/// BYOK update request.
#[derive(Debug, Deserialize)]
pub struct SaveByokRequest {
    /// The user the key belongs to.
    #[serde(alias = "userId")]
    pub user_id: String,
    /// Provider key; empty or null clears the stored key.
    #[serde(rename = "apiKey", alias = "api_key", default)]
    pub api_key: Option<String>,
}

/// BYOK update response.
#[derive(Debug, Serialize)]
pub struct SaveByokResponse {
    /// Always true on success.
    pub success: bool,
}

/// Store or clear the user's own provider key.
pub async fn save_byok(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SaveByokRequest>,
) -> Result<Json<SaveByokResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let key = body
        .api_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());
    let set = key.is_some();

    state.store.set_byok_key(&user_id, key)?;

    tracing::info!(user_id = %user_id, set, "BYOK key updated");

    Ok(Json(SaveByokResponse { success: true }))
}
