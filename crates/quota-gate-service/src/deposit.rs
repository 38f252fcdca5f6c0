//! Deposit handler.
//!
//! Confirmed payments credit the user's balance exactly once per payment
//! reference. The duplicate check and the credit happen in the same store
//! batch.

use std::sync::Arc;

use serde_json::Value;

use quota_gate_core::{Account, ConsumptionEntry, IdError, UserId};
use quota_gate_store::{Store, StoreError};

/// Credits granted when the checkout metadata does not name a quantity.
pub const DEFAULT_DEPOSIT_CREDITS: u64 = 100;

/// A confirmed payment to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    /// The paying user.
    pub user_id: UserId,
    /// Credits purchased.
    pub credits: u64,
    /// Idempotency key.
    pub payment_ref: String,
}

/// Errors extracting a deposit from a payment event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DepositError {
    /// Metadata carries no user id.
    #[error("checkout session metadata has no user id")]
    MissingUserId,

    /// Metadata user id is malformed.
    #[error("invalid user id: {0}")]
    InvalidUserId(#[from] IdError),

    /// Credit quantity is zero or unparsable.
    #[error("invalid credit quantity: {0}")]
    InvalidCredits(String),
}

impl Deposit {
    /// Build a deposit from a completed checkout session object.
    ///
    /// The session id is the idempotency key, falling back to the event id.
    /// `metadata.user_id` (or `metadata.userId`) names the user and
    /// `metadata.credits` the quantity, defaulting to
    /// [`DEFAULT_DEPOSIT_CREDITS`].
    ///
    /// # Errors
    ///
    /// Returns an error if the user id is missing or invalid, or the quantity
    /// is zero or not a non-negative integer.
    pub fn from_checkout_session(event_id: &str, session: &Value) -> Result<Self, DepositError> {
        let metadata = session.get("metadata");
        let field = |name: &str| metadata.and_then(|m| m.get(name)).filter(|v| !v.is_null());

        let user_id = field("user_id")
            .or_else(|| field("userId"))
            .and_then(Value::as_str)
            .ok_or(DepositError::MissingUserId)?;
        let user_id = UserId::new(user_id)?;

        let credits = match field("credits") {
            None => DEFAULT_DEPOSIT_CREDITS,
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| DepositError::InvalidCredits(s.clone()))?,
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| DepositError::InvalidCredits(n.to_string()))?,
            Some(other) => return Err(DepositError::InvalidCredits(other.to_string())),
        };
        if credits == 0 {
            return Err(DepositError::InvalidCredits("0".into()));
        }

        let payment_ref = session
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .unwrap_or(event_id)
            .to_string();

        Ok(Self {
            user_id,
            credits,
            payment_ref,
        })
    }
}

/// Result of applying a deposit.
#[derive(Debug, Clone)]
pub enum DepositOutcome {
    /// Credits were added.
    Applied {
        /// Account after the credit.
        account: Account,
        /// The deposit ledger entry.
        entry: ConsumptionEntry,
    },
    /// The payment reference was already applied; nothing changed.
    Duplicate,
}

/// Applies confirmed payments to balances.
pub struct DepositHandler {
    store: Arc<dyn Store>,
}

impl DepositHandler {
    /// Create a deposit handler.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Credit a deposit once.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the credit would overflow.
    pub fn apply(&self, deposit: Deposit) -> Result<DepositOutcome, StoreError> {
        let entry = ConsumptionEntry::deposit(
            deposit.user_id.clone(),
            deposit.credits,
            deposit.payment_ref.clone(),
        );

        match self.store.apply_deposit(&entry) {
            Ok(account) => {
                tracing::info!(
                    user_id = %deposit.user_id,
                    credits = deposit.credits,
                    balance = account.credits,
                    payment_ref = %deposit.payment_ref,
                    "Deposit applied"
                );
                Ok(DepositOutcome::Applied { account, entry })
            }
            Err(StoreError::DuplicateEvent { payment_ref }) => {
                tracing::info!(
                    user_id = %deposit.user_id,
                    payment_ref = %payment_ref,
                    "Duplicate payment event, skipping"
                );
                Ok(DepositOutcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }
}
