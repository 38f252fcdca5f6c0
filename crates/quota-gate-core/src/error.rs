//! Error types for quota-gate.

use crate::ids::IdError;
use crate::post::PostStatus;
use crate::PostId;

/// Result type for quota-gate core operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors raised by ledger and scheduling rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BillingError {
    /// No funding path: trial exhausted, credits short and no BYOK key.
    #[error("payment required: credits={credits}, required={required}")]
    PaymentRequired {
        /// Current credit balance.
        credits: u64,
        /// Credits the action costs.
        required: u64,
    },

    /// The trial allotment was consumed by a concurrent writer.
    #[error("trial allotment exhausted")]
    TrialExhausted,

    /// Insufficient credits for the operation.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: u64,
        /// Required amount.
        required: u64,
    },

    /// Credit balance would overflow.
    #[error("credit balance overflow")]
    BalanceOverflow,

    /// A post transition was attempted from a non-pending state.
    #[error("invalid post transition from {from} to {to}")]
    InvalidTransition {
        /// The current status.
        from: PostStatus,
        /// The requested status.
        to: PostStatus,
    },

    /// A failed post already has a replacement.
    #[error("post {post_id} was already re-enqueued as {requeued_to}")]
    AlreadyRequeued {
        /// The failed post.
        post_id: PostId,
        /// Its replacement.
        requeued_to: PostId,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Invalid amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}
