//! API handlers.

use quota_gate_core::UserId;

use crate::error::ApiError;

pub mod accounts;
pub mod byok;
pub mod generate;
pub mod health;
pub mod posts;
pub mod webhooks;

/// Parse a user id taken from a request body or path.
pub(crate) fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    UserId::new(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}
