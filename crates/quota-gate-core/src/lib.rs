//! Core types and rules for quota-gate.
//!
//! This crate holds the domain model shared by the store and the service:
//!
//! - **Identifiers**: `UserId`, `PostId`, `EntryId`
//! - **Accounts**: `Account` with trial, credit and BYOK funding sources
//! - **Entitlement**: `resolve` picks the funding mode for a generation
//! - **Ledger**: `ConsumptionEntry`, the append-only consumption log
//! - **Posts**: `ScheduledPost` and its pending → published/failed lifecycle
//!
//! # Funding priority
//!
//! 1. Trial allotment (5 free generations per new user)
//! 2. Prepaid credits (1 credit per generation by default)
//! 3. The user's own provider key (no balance change)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod entitlement;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod post;

pub use account::{Account, DEFAULT_GENERATION_COST, DEFAULT_TRIAL_USES};
pub use entitlement::{resolve, Entitlement, FundingMode};
pub use error::{BillingError, Result};
pub use ids::{EntryId, IdError, PostId, UserId, MAX_USER_ID_LEN};
pub use ledger::{ActionType, ConsumptionEntry, LedgerMode};
pub use post::{PostStatus, ScheduledPost};
