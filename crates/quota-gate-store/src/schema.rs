//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Consumption log entries, keyed by `entry_id` (ULID).
    pub const LEDGER: &str = "ledger";

    /// Index: entries by user, keyed by `len(user_id) || user_id || entry_id`.
    /// Value is empty (index only).
    pub const LEDGER_BY_USER: &str = "ledger_by_user";

    /// Applied payment references for deposit idempotency, keyed by payment ref.
    /// Value is the entry ID of the deposit.
    pub const PAYMENT_EVENTS: &str = "payment_events";

    /// Scheduled posts, keyed by `post_id`.
    pub const POSTS: &str = "posts";

    /// Index: pending posts by due time, keyed by `scheduled_time || post_id`.
    /// Value is empty (index only). Entries are removed when a post leaves
    /// the pending state.
    pub const POSTS_DUE: &str = "posts_due";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::LEDGER,
        cf::LEDGER_BY_USER,
        cf::PAYMENT_EVENTS,
        cf::POSTS,
        cf::POSTS_DUE,
    ]
}
