//! Account inspection handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use quota_gate_core::{Account, ActionType, ConsumptionEntry, LedgerMode};
use quota_gate_store::Store;

use super::parse_user_id;
use crate::error::ApiError;
use crate::state::AppState;

/// Largest ledger page served.
const MAX_LEDGER_PAGE: usize = 100;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Prepaid credit balance.
    pub credits: u64,
    /// Remaining free generations.
    pub trial_uses_left: u32,
    /// Whether a BYOK key is on file. The key itself is never returned.
    pub has_byok_key: bool,
    /// Created timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            credits: account.credits,
            trial_uses_left: account.trial_uses_left,
            has_byok_key: account.has_byok_key(),
            created_at: account.created_at.to_rfc3339(),
            updated_at: account.updated_at.to_rfc3339(),
        }
    }
}

/// Get a user's balance snapshot.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;

    let account = state
        .store
        .get_account(&user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(AccountResponse::from(&account)))
}

/// Ledger list query parameters.
#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    /// Maximum number of entries to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Ledger entry response.
#[derive(Debug, Serialize)]
pub struct LedgerEntryResponse {
    /// Entry ID.
    pub id: String,
    /// Action type.
    pub action: ActionType,
    /// Credits charged or credited.
    pub cost: u64,
    /// Funding mode.
    pub mode: LedgerMode,
    /// Artifact reference for generations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    /// Payment reference for deposits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_ref: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&ConsumptionEntry> for LedgerEntryResponse {
    fn from(entry: &ConsumptionEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            action: entry.action,
            cost: entry.cost,
            mode: entry.mode,
            artifact_ref: entry.artifact_ref.clone(),
            payment_ref: entry.payment_ref.clone(),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// Ledger list response.
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    /// Entries (newest first).
    pub entries: Vec<LedgerEntryResponse>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// List a user's consumption log.
pub async fn list_ledger(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;

    state
        .store
        .get_account(&user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(MAX_LEDGER_PAGE);
    let entries = state
        .store
        .list_entries_by_user(&user_id, limit + 1, query.offset)?;

    let has_more = entries.len() > limit;
    let entries = entries
        .iter()
        .take(limit)
        .map(LedgerEntryResponse::from)
        .collect();

    Ok(Json(LedgerResponse { entries, has_more }))
}
