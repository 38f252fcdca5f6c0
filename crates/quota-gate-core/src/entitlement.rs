//! Entitlement resolution.
//!
//! Decides which funding source pays for a generation. Priority is fixed:
//! trial allotment, then prepaid credits, then the user's own key. The
//! decision is a pure function of a balance snapshot; the store re-checks it
//! when the resulting entry is committed.

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::Account;

/// How a generation is funded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundingMode {
    /// Free trial use, system credential.
    Trial,
    /// Prepaid credits, system credential.
    Credit,
    /// User-supplied provider key.
    Byok,
}

impl FundingMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "TRIAL",
            Self::Credit => "CREDIT",
            Self::Byok => "BYOK",
        }
    }
}

impl std::fmt::Display for FundingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved entitlement together with the credential it implies.
#[derive(Clone, PartialEq, Eq)]
pub enum Entitlement {
    /// Funded by the trial allotment.
    Trial,
    /// Funded by prepaid credits.
    Credit,
    /// Funded by the user's own key.
    Byok {
        /// The user's provider key.
        api_key: String,
    },
}

impl Entitlement {
    /// The funding mode of this entitlement.
    #[must_use]
    pub const fn mode(&self) -> FundingMode {
        match self {
            Self::Trial => FundingMode::Trial,
            Self::Credit => FundingMode::Credit,
            Self::Byok { .. } => FundingMode::Byok,
        }
    }

    /// Credits charged for an action of the given cost.
    #[must_use]
    pub const fn charged(&self, cost: u64) -> u64 {
        match self {
            Self::Credit => cost,
            Self::Trial | Self::Byok { .. } => 0,
        }
    }

    /// The user credential to call the provider with, `None` for the system
    /// credential.
    #[must_use]
    pub fn user_key(&self) -> Option<&str> {
        match self {
            Self::Byok { api_key } => Some(api_key),
            Self::Trial | Self::Credit => None,
        }
    }
}

impl std::fmt::Debug for Entitlement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entitlement({})", self.mode())
    }
}

/// Resolve how an action of `cost` credits is funded for `account`.
///
/// # Errors
///
/// Returns [`BillingError::PaymentRequired`] when the trial is exhausted, the
/// credit balance is below `cost` and no BYOK key is on file.
pub fn resolve(account: &Account, cost: u64) -> Result<Entitlement> {
    if account.trial_uses_left > 0 {
        return Ok(Entitlement::Trial);
    }
    if account.has_sufficient_credits(cost) {
        return Ok(Entitlement::Credit);
    }
    match account.byok_key.as_deref() {
        Some(key) if !key.is_empty() => Ok(Entitlement::Byok {
            api_key: key.to_string(),
        }),
        _ => Err(BillingError::PaymentRequired {
            credits: account.credits,
            required: cost,
        }),
    }
}
