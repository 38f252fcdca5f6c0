//! Error types for quota-gate storage.

use quota_gate_core::BillingError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Record identifier.
        id: String,
    },

    /// Record already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Record identifier.
        id: String,
    },

    /// The current record no longer satisfies the write's precondition.
    #[error("rejected: {0}")]
    Rejected(#[from] BillingError),

    /// Payment reference already applied (idempotency check failed).
    #[error("duplicate payment event: {payment_ref}")]
    DuplicateEvent {
        /// The payment reference that was replayed.
        payment_ref: String,
    },
}
