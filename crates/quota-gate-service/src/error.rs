//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use quota_gate_core::BillingError;
use quota_gate_store::StoreError;

use crate::dispatch::DispatchError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No funding path for the request.
    #[error("payment required: credits={credits}, required={required}")]
    PaymentRequired {
        /// Current credit balance.
        credits: u64,
        /// Credits the action costs.
        required: u64,
    },

    /// Generation or artifact storage failed; nothing was charged.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// The artifact exists but the ledger commit did not happen.
    #[error("ledger commit failed: {0}")]
    LedgerCommitFailed(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::PaymentRequired { credits, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "payment_required",
                "Trial exhausted, insufficient credits and no API key on file".to_string(),
                Some(serde_json::json!({
                    "credits": credits,
                    "required": required
                })),
            ),
            Self::GenerationFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "generation_failed",
                format!("Generation failed: {msg}"),
                None,
            ),
            Self::LedgerCommitFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ledger_commit_failed",
                "The artifact was generated but could not be recorded".to_string(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::PaymentRequired { credits, required } => {
                Self::PaymentRequired { credits, required }
            }
            BillingError::InvalidId(_) | BillingError::InvalidAmount(_) => {
                Self::BadRequest(err.to_string())
            }
            BillingError::TrialExhausted
            | BillingError::InsufficientCredits { .. }
            | BillingError::BalanceOverflow
            | BillingError::InvalidTransition { .. }
            | BillingError::AlreadyRequeued { .. } => Self::Conflict(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::AlreadyExists { entity, id } => {
                Self::Conflict(format!("{entity} already exists: {id}"))
            }
            StoreError::DuplicateEvent { payment_ref } => {
                Self::Conflict(format!("Payment {payment_ref} already processed"))
            }
            StoreError::Rejected(e) => e.into(),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::InvalidPrompt(msg) => Self::BadRequest(msg),
            DispatchError::PaymentRequired { credits, required } => {
                Self::PaymentRequired { credits, required }
            }
            DispatchError::GenerationFailed(e) => Self::GenerationFailed(e.to_string()),
            e @ DispatchError::LedgerCommitFailed { .. } => Self::LedgerCommitFailed(e.to_string()),
            DispatchError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn business_rejections_map_to_client_errors() {
        assert_eq!(
            status_of(BillingError::PaymentRequired { credits: 0, required: 1 }.into()),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(StoreError::NotFound { entity: "account", id: "u".into() }.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(BillingError::InvalidAmount("zero".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn store_failures_stay_internal() {
        assert_eq!(
            status_of(StoreError::Database("io".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
