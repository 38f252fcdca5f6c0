//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in column families.

use quota_gate_core::{EntryId, PostId, UserId};

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a ledger entry key from an entry ID.
#[must_use]
pub fn entry_key(entry_id: &EntryId) -> Vec<u8> {
    entry_id.to_bytes().to_vec()
}

/// Create a prefix for iterating all ledger entries of a user.
///
/// Format: `len(user_id) as u16 BE || user_id`
///
/// User IDs are variable length, so the length prefix keeps `"ab"` from
/// matching the entries of `"abc"`.
#[must_use]
pub fn user_entries_prefix(user_id: &UserId) -> Vec<u8> {
    let bytes = user_id.as_bytes();
    let mut key = Vec::with_capacity(2 + bytes.len() + 16);
    // UserId length is bounded by MAX_USER_ID_LEN, well below u16::MAX.
    let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(bytes);
    key
}

/// Create a user-entry index key.
///
/// Format: `user_entries_prefix(user_id) || entry_id (16 bytes)`
///
/// Since ULIDs are time-ordered, entries for a user are sorted by time.
#[must_use]
pub fn user_entry_key(user_id: &UserId, entry_id: &EntryId) -> Vec<u8> {
    let mut key = user_entries_prefix(user_id);
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Extract the entry ID from a user-entry index key.
///
/// Returns `None` if the key is shorter than an entry ID.
#[must_use]
pub fn extract_entry_id_from_user_key(key: &[u8]) -> Option<EntryId> {
    let start = key.len().checked_sub(16)?;
    let bytes: [u8; 16] = key[start..].try_into().ok()?;
    Some(EntryId::from_bytes(bytes))
}

/// Create a payment event key from a payment reference.
#[must_use]
pub fn payment_event_key(payment_ref: &str) -> Vec<u8> {
    payment_ref.as_bytes().to_vec()
}

/// Create a post key from a post ID.
#[must_use]
pub fn post_key(post_id: &PostId) -> Vec<u8> {
    post_id.as_bytes().to_vec()
}

/// Encode a signed timestamp so that byte order matches numeric order.
fn encode_time(scheduled_time: i64) -> [u8; 8] {
    // Flipping the sign bit maps i64 order onto u64 order.
    #[allow(clippy::cast_sign_loss)]
    let ordered = (scheduled_time as u64) ^ (1 << 63);
    ordered.to_be_bytes()
}

/// Create a due-index key.
///
/// Format: `scheduled_time (8 bytes, order-preserving) || post_id (16 bytes)`
#[must_use]
pub fn post_due_key(scheduled_time: i64, post_id: &PostId) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(&encode_time(scheduled_time));
    key.extend_from_slice(post_id.as_bytes());
    key
}

/// Upper bound (exclusive) of due-index keys for posts due at or before `now`.
#[must_use]
pub fn post_due_upper_bound(now: i64) -> Vec<u8> {
    match now.checked_add(1) {
        Some(next) => encode_time(next).to_vec(),
        // Everything is due; sorts after every 24-byte due key.
        None => vec![0xff; 25],
    }
}

/// Decode a due-index key into its post ID.
///
/// Returns `None` if the key is not 24 bytes.
#[must_use]
pub fn decode_post_due_key(key: &[u8]) -> Option<PostId> {
    if key.len() != 24 {
        return None;
    }
    let bytes: [u8; 16] = key[8..24].try_into().ok()?;
    Some(PostId::from_bytes(bytes))
}
