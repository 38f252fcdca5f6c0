//! `RocksDB` storage layer for quota-gate.
//!
//! This crate persists accounts, the consumption log, payment idempotency
//! markers and scheduled posts using `RocksDB` column families.
//!
//! # Architecture
//!
//! - `accounts`: account records, keyed by `user_id`
//! - `ledger`: consumption entries, keyed by `entry_id` (ULID)
//! - `ledger_by_user`: index for listing a user's entries
//! - `payment_events`: applied payment references
//! - `posts`: scheduled posts, keyed by `post_id`
//! - `posts_due`: index of pending posts by scheduled time
//!
//! Every balance or post mutation is a read-modify-write performed under a
//! single writer lock and committed as one `WriteBatch`, so two writers can
//! never both act on the same snapshot.
//!
//! # Example
//!
//! ```no_run
//! use quota_gate_store::{RocksStore, Store};
//! use quota_gate_core::UserId;
//!
//! let store = RocksStore::open("/tmp/quota-gate-db").unwrap();
//!
//! let user_id = UserId::new("user-1").unwrap();
//! let account = store.get_or_create_account(&user_id).unwrap();
//! assert_eq!(account.trial_uses_left, 5);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use quota_gate_core::{Account, ConsumptionEntry, EntryId, PostId, ScheduledPost, UserId};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer so the dispatcher and publish
/// runner can be exercised against any transactional backend.
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Get an account, creating it with the default trial allotment if absent.
    ///
    /// Concurrent first calls for the same user all observe the same record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_or_create_account(&self, user_id: &UserId) -> Result<Account>;

    /// Set or clear the user's own provider key, creating the account if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn set_byok_key(&self, user_id: &UserId, byok_key: Option<String>) -> Result<Account>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Get a consumption entry by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_entry(&self, entry_id: &EntryId) -> Result<Option<ConsumptionEntry>>;

    /// List entries for a user, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_entries_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConsumptionEntry>>;

    /// Check if a payment reference has already been applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_payment_event(&self, payment_ref: &str) -> Result<bool>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Apply a generation entry's balance change and append the entry atomically.
    ///
    /// The entry's precondition is re-checked against the stored account.
    /// Returns the account after the update.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::Rejected` if the balance no longer covers the entry.
    fn commit_generation(&self, entry: &ConsumptionEntry) -> Result<Account>;

    /// Credit a deposit entry and record its payment reference atomically.
    ///
    /// Creates the account if it does not exist yet.
    /// Returns the account after the update.
    ///
    /// # Errors
    ///
    /// - `StoreError::DuplicateEvent` if the payment reference was already applied.
    /// - `StoreError::Rejected` if the entry is not a valid deposit.
    fn apply_deposit(&self, entry: &ConsumptionEntry) -> Result<Account>;

    // =========================================================================
    // Scheduled Post Operations
    // =========================================================================

    /// Insert a new post, indexing it as due if pending.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if a post with the same ID exists.
    fn insert_post(&self, post: &ScheduledPost) -> Result<()>;

    /// Get a post by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_post(&self, post_id: &PostId) -> Result<Option<ScheduledPost>>;

    /// List pending posts with `scheduled_time <= now`, earliest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_due_posts(&self, now: i64, limit: usize) -> Result<Vec<ScheduledPost>>;

    /// Re-enqueue a failed post as a new pending post.
    ///
    /// The new post and the failed post's `requeued_to` link are written in
    /// one batch, so each failed post yields at most one replacement.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the post doesn't exist.
    /// - `StoreError::Rejected` if the post has not failed or was already
    ///   re-enqueued.
    fn requeue_post(&self, post_id: &PostId, scheduled_time: Option<i64>)
        -> Result<ScheduledPost>;

    /// Persist a post's terminal status and drop it from the due index.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the post doesn't exist.
    /// - `StoreError::Rejected` if the stored post is no longer pending or the
    ///   given post is not terminal.
    fn finish_post(&self, post: &ScheduledPost) -> Result<()>;
}
