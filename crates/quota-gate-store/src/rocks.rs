//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use quota_gate_core::{
    Account, BillingError, ConsumptionEntry, EntryId, PostId, PostStatus, ScheduledPost, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serialises read-modify-write batches.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Acquire the writer lock.
    fn write_guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Commit a batch.
    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Read and decode a value.
    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Stage an account update, a ledger entry and its user index in `batch`.
    fn stage_entry(
        &self,
        batch: &mut WriteBatch,
        account: &Account,
        entry: &ConsumptionEntry,
    ) -> Result<()> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_ledger = self.cf(cf::LEDGER)?;
        let cf_by_user = self.cf(cf::LEDGER_BY_USER)?;

        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.user_id),
            Self::serialize(account)?,
        );
        batch.put_cf(&cf_ledger, keys::entry_key(&entry.id), Self::serialize(entry)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_entry_key(&entry.user_id, &entry.id),
            [],
        );
        Ok(())
    }

    fn account_not_found(user_id: &UserId) -> StoreError {
        StoreError::NotFound {
            entity: "account",
            id: user_id.to_string(),
        }
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        self.get_value(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    fn get_or_create_account(&self, user_id: &UserId) -> Result<Account> {
        if let Some(account) = self.get_account(user_id)? {
            return Ok(account);
        }

        let _guard = self.write_guard()?;

        // A concurrent first request may have created it while we waited.
        if let Some(account) = self.get_account(user_id)? {
            return Ok(account);
        }

        let account = Account::new(user_id.clone());
        let cf = self.cf(cf::ACCOUNTS)?;
        self.db
            .put_cf(&cf, keys::account_key(user_id), Self::serialize(&account)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(user_id = %user_id, "Account created");
        Ok(account)
    }

    fn set_byok_key(&self, user_id: &UserId, byok_key: Option<String>) -> Result<Account> {
        let _guard = self.write_guard()?;

        let mut account = self
            .get_account(user_id)?
            .unwrap_or_else(|| Account::new(user_id.clone()));
        account.byok_key = byok_key;
        account.updated_at = chrono::Utc::now();

        let cf = self.cf(cf::ACCOUNTS)?;
        self.db
            .put_cf(&cf, keys::account_key(user_id), Self::serialize(&account)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(account)
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    fn get_entry(&self, entry_id: &EntryId) -> Result<Option<ConsumptionEntry>> {
        self.get_value(cf::LEDGER, &keys::entry_key(entry_id))
    }

    fn list_entries_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConsumptionEntry>> {
        let cf_by_user = self.cf(cf::LEDGER_BY_USER)?;
        let prefix = keys::user_entries_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        // Collect all matching keys first (ULIDs are naturally time-ordered)
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            all_keys.push(key.to_vec());
        }

        // Reverse to get newest first
        all_keys.reverse();

        let mut entries = Vec::new();
        for key in all_keys.into_iter().skip(offset).take(limit) {
            let entry_id = keys::extract_entry_id_from_user_key(&key)
                .ok_or_else(|| StoreError::Database("malformed ledger index key".into()))?;
            if let Some(entry) = self.get_entry(&entry_id)? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    fn has_payment_event(&self, payment_ref: &str) -> Result<bool> {
        let cf = self.cf(cf::PAYMENT_EVENTS)?;
        let exists = self
            .db
            .get_cf(&cf, keys::payment_event_key(payment_ref))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        Ok(exists)
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    fn commit_generation(&self, entry: &ConsumptionEntry) -> Result<Account> {
        let _guard = self.write_guard()?;

        let mut account = self
            .get_account(&entry.user_id)?
            .ok_or_else(|| Self::account_not_found(&entry.user_id))?;

        account.apply_generation(entry)?;

        let mut batch = WriteBatch::default();
        self.stage_entry(&mut batch, &account, entry)?;
        self.write(batch)?;

        Ok(account)
    }

    fn apply_deposit(&self, entry: &ConsumptionEntry) -> Result<Account> {
        let payment_ref = entry.payment_ref.as_deref().ok_or_else(|| {
            StoreError::Rejected(BillingError::InvalidAmount(
                "deposit without payment reference".into(),
            ))
        })?;

        let _guard = self.write_guard()?;

        if self.has_payment_event(payment_ref)? {
            return Err(StoreError::DuplicateEvent {
                payment_ref: payment_ref.to_string(),
            });
        }

        let mut account = self
            .get_account(&entry.user_id)?
            .unwrap_or_else(|| Account::new(entry.user_id.clone()));
        account.apply_deposit(entry)?;

        let cf_payments = self.cf(cf::PAYMENT_EVENTS)?;
        let mut batch = WriteBatch::default();
        self.stage_entry(&mut batch, &account, entry)?;
        batch.put_cf(
            &cf_payments,
            keys::payment_event_key(payment_ref),
            entry.id.to_bytes(),
        );
        self.write(batch)?;

        Ok(account)
    }

    // =========================================================================
    // Scheduled Post Operations
    // =========================================================================

    fn insert_post(&self, post: &ScheduledPost) -> Result<()> {
        let _guard = self.write_guard()?;

        if self.get_post(&post.id)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "post",
                id: post.id.to_string(),
            });
        }

        let cf_posts = self.cf(cf::POSTS)?;
        let cf_due = self.cf(cf::POSTS_DUE)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_posts, keys::post_key(&post.id), Self::serialize(post)?);
        if post.status == PostStatus::Pending {
            batch.put_cf(&cf_due, keys::post_due_key(post.scheduled_time, &post.id), []);
        }
        self.write(batch)
    }

    fn get_post(&self, post_id: &PostId) -> Result<Option<ScheduledPost>> {
        self.get_value(cf::POSTS, &keys::post_key(post_id))
    }

    fn list_due_posts(&self, now: i64, limit: usize) -> Result<Vec<ScheduledPost>> {
        let cf_due = self.cf(cf::POSTS_DUE)?;
        let upper = keys::post_due_upper_bound(now);

        let mut posts = Vec::new();
        for item in self.db.iterator_cf(&cf_due, IteratorMode::Start) {
            if posts.len() >= limit {
                break;
            }

            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if &key[..] >= upper.as_slice() {
                break;
            }

            let Some(post_id) = keys::decode_post_due_key(&key) else {
                tracing::warn!(key_len = key.len(), "Skipping malformed due index key");
                continue;
            };

            match self.get_post(&post_id)? {
                Some(post) if post.is_due(now) => posts.push(post),
                Some(post) => {
                    tracing::warn!(post_id = %post_id, status = %post.status, "Stale due index entry");
                }
                None => {
                    tracing::warn!(post_id = %post_id, "Due index points at missing post");
                }
            }
        }

        Ok(posts)
    }

    fn requeue_post(
        &self,
        post_id: &PostId,
        scheduled_time: Option<i64>,
    ) -> Result<ScheduledPost> {
        let _guard = self.write_guard()?;

        let mut failed = self.get_post(post_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "post",
            id: post_id.to_string(),
        })?;
        let post = failed.requeue(scheduled_time)?;

        let cf_posts = self.cf(cf::POSTS)?;
        let cf_due = self.cf(cf::POSTS_DUE)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_posts, keys::post_key(&failed.id), Self::serialize(&failed)?);
        batch.put_cf(&cf_posts, keys::post_key(&post.id), Self::serialize(&post)?);
        batch.put_cf(&cf_due, keys::post_due_key(post.scheduled_time, &post.id), []);
        self.write(batch)?;

        Ok(post)
    }

    fn finish_post(&self, post: &ScheduledPost) -> Result<()> {
        if post.status == PostStatus::Pending {
            return Err(StoreError::Rejected(BillingError::InvalidTransition {
                from: PostStatus::Pending,
                to: PostStatus::Pending,
            }));
        }

        let _guard = self.write_guard()?;

        let stored = self.get_post(&post.id)?.ok_or_else(|| StoreError::NotFound {
            entity: "post",
            id: post.id.to_string(),
        })?;

        if stored.status != PostStatus::Pending {
            return Err(StoreError::Rejected(BillingError::InvalidTransition {
                from: stored.status,
                to: post.status,
            }));
        }

        let cf_posts = self.cf(cf::POSTS)?;
        let cf_due = self.cf(cf::POSTS_DUE)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_posts, keys::post_key(&post.id), Self::serialize(post)?);
        batch.delete_cf(&cf_due, keys::post_due_key(stored.scheduled_time, &post.id));
        self.write(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quota_gate_core::{Entitlement, DEFAULT_TRIAL_USES};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    fn post_at(scheduled_time: i64) -> ScheduledPost {
        ScheduledPost::new(
            scheduled_time,
            "https://cdn.example.com/img.jpg".into(),
            "caption".into(),
            "page-1".into(),
            "token".into(),
        )
    }

    #[test]
    fn first_sight_creates_trial_account_once() {
        let (store, _dir) = create_test_store();
        let user_id = user("alice");

        assert!(store.get_account(&user_id).unwrap().is_none());

        let created = store.get_or_create_account(&user_id).unwrap();
        assert_eq!(created.trial_uses_left, DEFAULT_TRIAL_USES);
        assert_eq!(created.credits, 0);

        let again = store.get_or_create_account(&user_id).unwrap();
        assert_eq!(again.created_at, created.created_at);
    }

    #[test]
    fn concurrent_first_sight_yields_one_record() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = user("racer");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let user_id = user_id.clone();
                std::thread::spawn(move || store.get_or_create_account(&user_id).unwrap())
            })
            .collect();

        let created: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(created.iter().all(|a| a.created_at == created[0].created_at));
    }

    #[test]
    fn commit_generation_debits_and_logs_atomically() {
        let (store, _dir) = create_test_store();
        let user_id = user("bob");
        store.get_or_create_account(&user_id).unwrap();

        let entry = ConsumptionEntry::generation(
            user_id.clone(),
            &Entitlement::Trial,
            1,
            "https://cdn/gen-1.jpg".into(),
        );
        let account = store.commit_generation(&entry).unwrap();
        assert_eq!(account.trial_uses_left, DEFAULT_TRIAL_USES - 1);

        let stored = store.get_entry(&entry.id).unwrap().unwrap();
        assert_eq!(stored, entry);

        let listed = store.list_entries_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn commit_generation_rejects_stale_credit_decision() {
        let (store, _dir) = create_test_store();
        let user_id = user("carol");
        store
            .apply_deposit(&ConsumptionEntry::deposit(user_id.clone(), 1, "cs_1".into()))
            .unwrap();
        for _ in 0..DEFAULT_TRIAL_USES {
            let trial =
                ConsumptionEntry::generation(user_id.clone(), &Entitlement::Trial, 1, "t".into());
            store.commit_generation(&trial).unwrap();
        }

        let first = ConsumptionEntry::generation(user_id.clone(), &Entitlement::Credit, 1, "a".into());
        let second = ConsumptionEntry::generation(user_id.clone(), &Entitlement::Credit, 1, "b".into());
        assert_eq!(store.commit_generation(&first).unwrap().credits, 0);
        assert!(matches!(
            store.commit_generation(&second),
            Err(StoreError::Rejected(BillingError::InsufficientCredits {
                balance: 0,
                required: 1
            }))
        ));
        assert!(store.get_entry(&second.id).unwrap().is_none());
    }

    #[test]
    fn concurrent_trial_commits_grant_exactly_one() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = user("dave");
        store.get_or_create_account(&user_id).unwrap();
        for _ in 1..DEFAULT_TRIAL_USES {
            let e = ConsumptionEntry::generation(user_id.clone(), &Entitlement::Trial, 1, "x".into());
            store.commit_generation(&e).unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let user_id = user_id.clone();
                std::thread::spawn(move || {
                    let e = ConsumptionEntry::generation(
                        user_id,
                        &Entitlement::Trial,
                        1,
                        format!("ref-{i}"),
                    );
                    store.commit_generation(&e).is_ok()
                })
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 1);
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().trial_uses_left, 0);
    }

    #[test]
    fn deposit_is_idempotent_per_payment_ref() {
        let (store, _dir) = create_test_store();
        let user_id = user("erin");

        let deposit = ConsumptionEntry::deposit(user_id.clone(), 100, "cs_test_abc".into());
        let account = store.apply_deposit(&deposit).unwrap();
        assert_eq!(account.credits, 100);
        assert_eq!(account.trial_uses_left, DEFAULT_TRIAL_USES);
        assert!(store.has_payment_event("cs_test_abc").unwrap());

        let replay = ConsumptionEntry::deposit(user_id.clone(), 100, "cs_test_abc".into());
        assert!(matches!(
            store.apply_deposit(&replay),
            Err(StoreError::DuplicateEvent { .. })
        ));

        assert_eq!(store.get_account(&user_id).unwrap().unwrap().credits, 100);
        assert_eq!(store.list_entries_by_user(&user_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn ledger_listing_is_newest_first_and_paginated() {
        let (store, _dir) = create_test_store();
        let user_id = user("frank");

        store
            .apply_deposit(&ConsumptionEntry::deposit(user_id.clone(), 5, "p1".into()))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store
            .apply_deposit(&ConsumptionEntry::deposit(user_id.clone(), 7, "p2".into()))
            .unwrap();

        // Another user's entries must not leak into the listing.
        store
            .apply_deposit(&ConsumptionEntry::deposit(user("frank2"), 1, "p3".into()))
            .unwrap();

        let all = store.list_entries_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].cost, 7);
        assert_eq!(all[1].cost, 5);

        let page2 = store.list_entries_by_user(&user_id, 1, 1).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].cost, 5);
    }

    #[test]
    fn byok_key_set_and_cleared() {
        let (store, _dir) = create_test_store();
        let user_id = user("gina");

        let account = store.set_byok_key(&user_id, Some("sk-user".into())).unwrap();
        assert!(account.has_byok_key());
        assert_eq!(account.trial_uses_left, DEFAULT_TRIAL_USES);

        let cleared = store.set_byok_key(&user_id, None).unwrap();
        assert!(cleared.byok_key.is_none());
    }

    #[test]
    fn due_posts_respect_time_and_status() {
        let (store, _dir) = create_test_store();
        let early = post_at(100);
        let on_time = post_at(200);
        let future = post_at(300);
        for p in [&future, &early, &on_time] {
            store.insert_post(p).unwrap();
        }

        let due = store.list_due_posts(200, 10).unwrap();
        let ids: Vec<_> = due.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![early.id, on_time.id]);

        assert_eq!(store.list_due_posts(200, 1).unwrap().len(), 1);
        assert!(store.list_due_posts(99, 10).unwrap().is_empty());
    }

    #[test]
    fn finish_post_is_single_shot() {
        let (store, _dir) = create_test_store();
        let post = post_at(10);
        store.insert_post(&post).unwrap();
        assert!(matches!(
            store.insert_post(&post),
            Err(StoreError::AlreadyExists { .. })
        ));

        let mut published = post.clone();
        published.mark_published("fb_1".into()).unwrap();
        store.finish_post(&published).unwrap();

        assert!(store.list_due_posts(i64::MAX, 10).unwrap().is_empty());
        let stored = store.get_post(&post.id).unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);

        let mut failed = post.clone();
        failed.mark_failed("late failure".into()).unwrap();
        assert!(matches!(
            store.finish_post(&failed),
            Err(StoreError::Rejected(BillingError::InvalidTransition { .. }))
        ));
        assert!(matches!(
            store.finish_post(&post),
            Err(StoreError::Rejected(_))
        ));
    }

    #[test]
    fn requeue_links_failed_post_once() {
        let (store, _dir) = create_test_store();
        let post = post_at(10);
        store.insert_post(&post).unwrap();

        assert!(matches!(
            store.requeue_post(&post.id, None),
            Err(StoreError::Rejected(BillingError::InvalidTransition { .. }))
        ));

        let mut failed = post.clone();
        failed.mark_failed("token expired".into()).unwrap();
        store.finish_post(&failed).unwrap();

        let copy = store.requeue_post(&post.id, Some(20)).unwrap();
        assert_eq!(copy.requeued_from, Some(post.id));

        let stored = store.get_post(&post.id).unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert_eq!(stored.requeued_to, Some(copy.id));

        assert!(matches!(
            store.requeue_post(&post.id, Some(30)),
            Err(StoreError::Rejected(BillingError::AlreadyRequeued { .. }))
        ));
        let due: Vec<_> = store
            .list_due_posts(i64::MAX, 10)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(due, vec![copy.id]);
    }

    #[test]
    fn concurrent_requeues_create_one_replacement() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let mut post = post_at(10);
        store.insert_post(&post).unwrap();
        post.mark_failed("token expired".into()).unwrap();
        store.finish_post(&post).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let post_id = post.id;
                std::thread::spawn(move || store.requeue_post(&post_id, None).is_ok())
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(created, 1);
        assert_eq!(store.list_due_posts(i64::MAX, 10).unwrap().len(), 1);
    }
}
