//! Account types for quota-gate.
//!
//! An account holds the three funding sources a generation can draw on: the
//! free trial allotment, the prepaid credit balance and an optional
//! user-supplied provider key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::ledger::{ConsumptionEntry, LedgerMode};
use crate::UserId;

// ============================================================================
// Constants
// ============================================================================

/// Free generations granted to every new user.
pub const DEFAULT_TRIAL_USES: u32 = 5;

/// Default credit cost of one generation.
pub const DEFAULT_GENERATION_COST: u64 = 1;

/// A balance account for a user.
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    /// The external user ID.
    pub user_id: UserId,

    /// Prepaid credit balance.
    pub credits: u64,

    /// Remaining free trial generations.
    pub trial_uses_left: u32,

    /// User-supplied provider key, if any.
    pub byok_key: Option<String>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a first-seen account: full trial allotment, no credits, no key.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            credits: 0,
            trial_uses_left: DEFAULT_TRIAL_USES,
            byok_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account has sufficient credits for a deduction.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: u64) -> bool {
        self.credits >= amount
    }

    /// Whether a BYOK credential is on file.
    #[must_use]
    pub fn has_byok_key(&self) -> bool {
        self.byok_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Apply the balance change recorded by a generation entry.
    ///
    /// The precondition of the entry's mode is checked against the current
    /// balance, so a stale entitlement decision cannot push a balance below
    /// zero or consume a trial use twice.
    ///
    /// # Errors
    ///
    /// - [`BillingError::TrialExhausted`] for a TRIAL entry with no uses left.
    /// - [`BillingError::InsufficientCredits`] for a CREDIT entry the balance
    ///   cannot cover.
    /// - [`BillingError::InvalidAmount`] for a mode that is not a generation
    ///   funding mode.
    pub fn apply_generation(&mut self, entry: &ConsumptionEntry) -> Result<()> {
        match entry.mode {
            LedgerMode::Trial => {
                self.trial_uses_left = self
                    .trial_uses_left
                    .checked_sub(1)
                    .ok_or(BillingError::TrialExhausted)?;
            }
            LedgerMode::Credit => {
                self.credits = self.credits.checked_sub(entry.cost).ok_or(
                    BillingError::InsufficientCredits {
                        balance: self.credits,
                        required: entry.cost,
                    },
                )?;
            }
            LedgerMode::Byok => {}
            LedgerMode::Stripe => {
                return Err(BillingError::InvalidAmount(
                    "deposit entry applied as generation".into(),
                ));
            }
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Apply a deposit entry, crediting `entry.cost` credits.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::BalanceOverflow`] if the balance would overflow
    /// and [`BillingError::InvalidAmount`] for a non-deposit entry.
    pub fn apply_deposit(&mut self, entry: &ConsumptionEntry) -> Result<()> {
        if entry.mode != LedgerMode::Stripe {
            return Err(BillingError::InvalidAmount(
                "generation entry applied as deposit".into(),
            ));
        }
        self.credits = self
            .credits
            .checked_add(entry.cost)
            .ok_or(BillingError::BalanceOverflow)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("user_id", &self.user_id)
            .field("credits", &self.credits)
            .field("trial_uses_left", &self.trial_uses_left)
            .field("byok_key", &self.byok_key.as_ref().map(|_| "<redacted>"))
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}
