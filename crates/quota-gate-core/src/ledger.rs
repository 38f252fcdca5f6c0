//! Consumption log types.
//!
//! Every billed action appends one immutable [`ConsumptionEntry`] in the same
//! store batch as the balance change it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entitlement::{Entitlement, FundingMode};
use crate::{EntryId, UserId};

/// One immutable line of the consumption log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionEntry {
    /// Unique entry ID (ULID for time-ordering).
    pub id: EntryId,

    /// The user whose ledger this entry belongs to.
    pub user_id: UserId,

    /// What happened.
    pub action: ActionType,

    /// Credits charged (generation) or credited (deposit).
    pub cost: u64,

    /// The funding mode actually used.
    pub mode: LedgerMode,

    /// Public reference of the generated artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,

    /// Idempotency key of the payment behind a deposit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_ref: Option<String>,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl ConsumptionEntry {
    /// Entry for a successful generation. `cost` is the per-action price; the
    /// recorded cost is what the entitlement actually charges.
    #[must_use]
    pub fn generation(
        user_id: UserId,
        entitlement: &Entitlement,
        cost: u64,
        artifact_ref: String,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            action: ActionType::Generation,
            cost: entitlement.charged(cost),
            mode: entitlement.mode().into(),
            artifact_ref: Some(artifact_ref),
            payment_ref: None,
            created_at: Utc::now(),
        }
    }

    /// Entry for a confirmed payment of `credits` credits.
    #[must_use]
    pub fn deposit(user_id: UserId, credits: u64, payment_ref: String) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            action: ActionType::Deposit,
            cost: credits,
            mode: LedgerMode::Stripe,
            artifact_ref: None,
            payment_ref: Some(payment_ref),
            created_at: Utc::now(),
        }
    }
}

/// Kind of ledger action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    /// A content generation.
    Generation,
    /// A credit purchase.
    Deposit,
}

/// Funding mode as recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerMode {
    /// Trial allotment.
    Trial,
    /// Prepaid credits.
    Credit,
    /// User-supplied key.
    Byok,
    /// Payment confirmed by Stripe.
    Stripe,
}

impl From<FundingMode> for LedgerMode {
    fn from(mode: FundingMode) -> Self {
        match mode {
            FundingMode::Trial => Self::Trial,
            FundingMode::Credit => Self::Credit,
            FundingMode::Byok => Self::Byok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    #[test]
    fn generation_entry_records_actual_charge() {
        let trial = ConsumptionEntry::generation(user(), &Entitlement::Trial, 3, "a".into());
        assert_eq!(trial.cost, 0);
        assert_eq!(trial.mode, LedgerMode::Trial);

        let credit = ConsumptionEntry::generation(user(), &Entitlement::Credit, 3, "b".into());
        assert_eq!(credit.cost, 3);
        assert_eq!(credit.mode, LedgerMode::Credit);
        assert_eq!(credit.artifact_ref.as_deref(), Some("b"));
    }

    #[test]
    fn deposit_entry_wire_format() {
        let entry = ConsumptionEntry::deposit(user(), 100, "cs_test_1".into());
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["action"], "DEPOSIT");
        assert_eq!(json["mode"], "STRIPE");
        assert_eq!(json["cost"], 100);
        assert_eq!(json["payment_ref"], "cs_test_1");
        assert!(json.get("artifact_ref").is_none());
    }
}
