//! Store wrapper with injectable write failures for unit tests.

use quota_gate_core::{Account, ConsumptionEntry, EntryId, PostId, ScheduledPost, UserId};
use quota_gate_store::{Result, RocksStore, Store, StoreError};

/// Delegates to a [`RocksStore`], failing the selected writes with
/// [`StoreError::Database`].
pub(crate) struct FaultyStore {
    pub inner: RocksStore,
    pub fail_commit: bool,
    pub fail_finish: bool,
}

impl FaultyStore {
    pub fn new(inner: RocksStore) -> Self {
        Self {
            inner,
            fail_commit: false,
            fail_finish: false,
        }
    }
}

fn injected() -> StoreError {
    StoreError::Database("injected write failure".into())
}

impl Store for FaultyStore {
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        self.inner.get_account(user_id)
    }

    fn get_or_create_account(&self, user_id: &UserId) -> Result<Account> {
        self.inner.get_or_create_account(user_id)
    }

    fn set_byok_key(&self, user_id: &UserId, byok_key: Option<String>) -> Result<Account> {
        self.inner.set_byok_key(user_id, byok_key)
    }

    fn get_entry(&self, entry_id: &EntryId) -> Result<Option<ConsumptionEntry>> {
        self.inner.get_entry(entry_id)
    }

    fn list_entries_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ConsumptionEntry>> {
        self.inner.list_entries_by_user(user_id, limit, offset)
    }

    fn has_payment_event(&self, payment_ref: &str) -> Result<bool> {
        self.inner.has_payment_event(payment_ref)
    }

    fn commit_generation(&self, entry: &ConsumptionEntry) -> Result<Account> {
        if self.fail_commit {
            return Err(injected());
        }
        self.inner.commit_generation(entry)
    }

    fn apply_deposit(&self, entry: &ConsumptionEntry) -> Result<Account> {
        self.inner.apply_deposit(entry)
    }

    fn insert_post(&self, post: &ScheduledPost) -> Result<()> {
        self.inner.insert_post(post)
    }

    fn get_post(&self, post_id: &PostId) -> Result<Option<ScheduledPost>> {
        self.inner.get_post(post_id)
    }

    fn list_due_posts(&self, now: i64, limit: usize) -> Result<Vec<ScheduledPost>> {
        self.inner.list_due_posts(now, limit)
    }

    fn requeue_post(&self, post_id: &PostId, scheduled_time: Option<i64>) -> Result<ScheduledPost> {
        self.inner.requeue_post(post_id, scheduled_time)
    }

    fn finish_post(&self, post: &ScheduledPost) -> Result<()> {
        if self.fail_finish {
            return Err(injected());
        }
        self.inner.finish_post(post)
    }
}
