//! Quota dispatcher.
//!
//! One generation request runs as: load or create the account, resolve the
//! funding mode, generate, then commit the balance change and its ledger entry
//! in one batch. The whole sequence holds a per-user lock, and the store
//! re-checks the balance at commit time, so a trial use or credit is never
//! granted twice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use quota_gate_core::{resolve, Account, BillingError, ConsumptionEntry, FundingMode, UserId};
use quota_gate_store::{Store, StoreError};

use crate::generation::{GenerationError, GenerationExecutor};

/// Longest prompt accepted, in characters.
pub const MAX_PROMPT_CHARS: usize = 4000;

/// Errors from [`QuotaDispatcher::dispatch`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Prompt is empty or too long.
    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    /// No funding path; nothing was written.
    #[error("payment required: credits={credits}, required={required}")]
    PaymentRequired {
        /// Current credit balance.
        credits: u64,
        /// Credits the action costs.
        required: u64,
    },

    /// Generation failed; the ledger was not touched.
    #[error("generation failed: {0}")]
    GenerationFailed(#[source] GenerationError),

    /// The artifact was stored but the ledger commit did not happen.
    #[error("ledger commit failed for {user_id} ({mode}, {artifact_ref}): {source}")]
    LedgerCommitFailed {
        /// The requesting user.
        user_id: UserId,
        /// The mode the request was resolved to.
        mode: FundingMode,
        /// The orphaned artifact.
        artifact_ref: String,
        /// The store failure.
        #[source]
        source: StoreError,
    },

    /// Store failure before generation started.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Public reference of the generated artifact.
    pub artifact_ref: String,
    /// The funding mode that paid for it.
    pub mode: FundingMode,
    /// The committed ledger entry.
    pub entry: ConsumptionEntry,
    /// The account after the commit.
    pub account: Account,
}

/// Orchestrates entitlement, generation and ledger commit.
pub struct QuotaDispatcher {
    store: Arc<dyn Store>,
    executor: GenerationExecutor,
    cost: u64,
    locks: UserLocks,
}

impl QuotaDispatcher {
    /// Create a dispatcher charging `cost` credits per CREDIT generation.
    pub fn new(store: Arc<dyn Store>, executor: GenerationExecutor, cost: u64) -> Self {
        Self {
            store,
            executor,
            cost,
            locks: UserLocks::default(),
        }
    }

    /// Run one generation request for `user_id`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidPrompt`] before any store access.
    /// - [`DispatchError::PaymentRequired`] when no funding mode applies.
    /// - [`DispatchError::GenerationFailed`] when the executor fails.
    /// - [`DispatchError::LedgerCommitFailed`] when the commit after a
    ///   successful generation fails.
    /// - [`DispatchError::Store`] when the account cannot be loaded.
    pub async fn dispatch(
        &self,
        user_id: &UserId,
        prompt: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        validate_prompt(prompt)?;

        let _guard = self.locks.acquire(user_id).await;

        let account = self.store.get_or_create_account(user_id)?;
        let entitlement = resolve(&account, self.cost).map_err(|e| match e {
            BillingError::PaymentRequired { credits, required } => {
                DispatchError::PaymentRequired { credits, required }
            }
            other => DispatchError::Store(StoreError::Rejected(other)),
        })?;
        let mode = entitlement.mode();

        tracing::debug!(
            user_id = %user_id,
            mode = %mode,
            trial_uses_left = account.trial_uses_left,
            credits = account.credits,
            "Resolved entitlement"
        );

        let artifact = self
            .executor
            .execute(prompt, &entitlement)
            .await
            .map_err(|e| {
                tracing::warn!(user_id = %user_id, mode = %mode, error = %e, "Generation failed");
                DispatchError::GenerationFailed(e)
            })?;

        let entry = ConsumptionEntry::generation(
            user_id.clone(),
            &entitlement,
            self.cost,
            artifact.public_ref.clone(),
        );

        let account = self.store.commit_generation(&entry).map_err(|source| {
            tracing::error!(
                user_id = %user_id,
                mode = %mode,
                artifact_ref = %artifact.public_ref,
                error = %source,
                "Ledger commit failed after generation"
            );
            DispatchError::LedgerCommitFailed {
                user_id: user_id.clone(),
                mode,
                artifact_ref: artifact.public_ref.clone(),
                source,
            }
        })?;

        tracing::info!(
            user_id = %user_id,
            mode = %mode,
            entry_id = %entry.id,
            cost = entry.cost,
            artifact_ref = %artifact.public_ref,
            "Generation committed"
        );

        Ok(DispatchOutcome {
            artifact_ref: artifact.public_ref,
            mode,
            entry,
            account,
        })
    }
}

fn validate_prompt(prompt: &str) -> Result<(), DispatchError> {
    if prompt.trim().is_empty() {
        return Err(DispatchError::InvalidPrompt("prompt must not be empty".into()));
    }
    let len = prompt.chars().count();
    if len > MAX_PROMPT_CHARS {
        return Err(DispatchError::InvalidPrompt(format!(
            "prompt is {len} characters, maximum is {MAX_PROMPT_CHARS}"
        )));
    }
    Ok(())
}

/// Per-user async locks.
///
/// Entries are removed when the last holder or waiter releases them. A waiter
/// cancelled after being handed the lock leaves its entry behind; such
/// entries are swept on the next acquire.
#[derive(Default)]
struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, user_id: &UserId) -> UserGuard<'_> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(user_id.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        UserGuard {
            locks: self,
            user_id: user_id.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self
            .locks
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if map
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::generation::{BlobStore, GeneratedImage, GenerationProvider};
    use crate::test_support::FaultyStore;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use quota_gate_core::LedgerMode;
    use quota_gate_store::RocksStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct StubProvider {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationProvider for StubProvider {
        async fn generate(
            &self,
            _prompt: &str,
            _api_key: Option<&str>,
        ) -> Result<GeneratedImage, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail {
                return Err(GenerationError::Provider("HTTP 500: boom".into()));
            }
            Ok(GeneratedImage {
                bytes: vec![1, 2, 3],
                content_type: "image/jpeg".into(),
            })
        }
    }

    struct MemBlobs;

    #[async_trait]
    impl BlobStore for MemBlobs {
        async fn put(&self, key: &str, _: &[u8], _: &str) -> Result<String, GenerationError> {
            Ok(format!("mem://{key}"))
        }
    }

    fn setup(fail: bool) -> (TempDir, Arc<RocksStore>, Arc<StubProvider>, QuotaDispatcher) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let provider = Arc::new(StubProvider {
            fail,
            calls: AtomicUsize::new(0),
        });
        let executor = GenerationExecutor::new(
            provider.clone(),
            Arc::new(MemBlobs),
            Some("system".into()),
            Duration::from_secs(5),
        );
        let dispatcher = QuotaDispatcher::new(store.clone(), executor, 1);
        (dir, store, provider, dispatcher)
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[tokio::test]
    async fn trial_then_payment_required() {
        let (_dir, store, _provider, dispatcher) = setup(false);
        let u = user("trial-user");

        for _ in 0..5 {
            let out = dispatcher.dispatch(&u, "a lighthouse").await.unwrap();
            assert_eq!(out.mode, FundingMode::Trial);
            assert_eq!(out.entry.cost, 0);
        }

        let err = dispatcher.dispatch(&u, "a lighthouse").await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::PaymentRequired { credits: 0, required: 1 }
        ));

        let account = store.get_account(&u).unwrap().unwrap();
        assert_eq!(account.trial_uses_left, 0);
        assert_eq!(store.list_entries_by_user(&u, 100, 0).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn provider_failure_leaves_ledger_untouched() {
        let (_dir, store, provider, dispatcher) = setup(true);
        let u = user("unlucky");

        let err = dispatcher.dispatch(&u, "anything").await.unwrap_err();
        assert!(matches!(err, DispatchError::GenerationFailed(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let account = store.get_account(&u).unwrap().unwrap();
        assert_eq!(account.trial_uses_left, 5);
        assert!(store.list_entries_by_user(&u, 10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_prompt_is_rejected_before_store_access() {
        let (_dir, store, provider, dispatcher) = setup(false);
        let u = user("prompter");

        let long = "x".repeat(MAX_PROMPT_CHARS + 1);
        for prompt in ["", "   ", long.as_str()] {
            let err = dispatcher.dispatch(&u, prompt).await.unwrap_err();
            assert!(matches!(err, DispatchError::InvalidPrompt(_)));
        }

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(store.get_account(&u).unwrap().is_none());
    }

    #[tokio::test]
    async fn byok_generation_records_zero_cost_entry() {
        let (_dir, store, _provider, dispatcher) = setup(false);
        let u = user("byok");
        store.set_byok_key(&u, Some("user-key".into())).unwrap();
        for _ in 0..5 {
            dispatcher.dispatch(&u, "p").await.unwrap();
        }

        let out = dispatcher.dispatch(&u, "p").await.unwrap();
        assert_eq!(out.mode, FundingMode::Byok);
        assert_eq!(out.entry.mode, LedgerMode::Byok);
        assert_eq!(out.entry.cost, 0);
        assert_eq!(out.account.credits, 0);
        assert_eq!(out.account.trial_uses_left, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatches_grant_last_trial_once() {
        let (_dir, store, _provider, dispatcher) = setup(false);
        let dispatcher = Arc::new(dispatcher);
        let u = user("racer");
        for _ in 0..4 {
            dispatcher.dispatch(&u, "warmup").await.unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                let u = u.clone();
                tokio::spawn(async move { dispatcher.dispatch(&u, "race").await })
            })
            .collect();

        let mut granted = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => granted += 1,
                Err(DispatchError::PaymentRequired { .. }) => refused += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(granted, 1);
        assert_eq!(refused, 7);
        assert_eq!(store.list_entries_by_user(&u, 100, 0).unwrap().len(), 5);
        assert_eq!(dispatcher.locks.len(), 0);
    }

    #[tokio::test]
    async fn failed_commit_reports_orphaned_artifact() {
        let dir = TempDir::new().unwrap();
        let mut faulty = FaultyStore::new(RocksStore::open(dir.path()).unwrap());
        faulty.fail_commit = true;
        let store = Arc::new(faulty);
        let executor = GenerationExecutor::new(
            Arc::new(StubProvider {
                fail: false,
                calls: AtomicUsize::new(0),
            }),
            Arc::new(MemBlobs),
            None,
            Duration::from_secs(5),
        );
        let dispatcher = QuotaDispatcher::new(store.clone(), executor, 1);
        let u = user("orphan");

        let err = dispatcher.dispatch(&u, "a harbour").await.unwrap_err();

        match &err {
            DispatchError::LedgerCommitFailed {
                user_id,
                mode,
                artifact_ref,
                source,
            } => {
                assert_eq!(user_id, &u);
                assert_eq!(*mode, FundingMode::Trial);
                assert!(artifact_ref.starts_with("mem://gen-"));
                assert!(matches!(source, StoreError::Database(_)));
            }
            other => panic!("unexpected error: {other}"),
        }

        let account = store.get_account(&u).unwrap().unwrap();
        assert_eq!(account.trial_uses_left, 5);
        assert!(store.list_entries_by_user(&u, 10, 0).unwrap().is_empty());

        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["code"], "ledger_commit_failed");
    }

    #[tokio::test]
    async fn cancelled_waiter_entry_is_swept() {
        let locks = UserLocks::default();
        let a = user("a");

        let holder = locks.acquire(&a).await;
        let mut waiter = Box::pin(locks.acquire(&a));
        assert!(futures::poll!(&mut waiter).is_pending());

        // The waiter still holds its clone when the holder releases.
        drop(holder);
        drop(waiter);
        assert_eq!(locks.len(), 1);

        drop(locks.acquire(&user("b")).await);
        assert_eq!(locks.len(), 0);
    }
}
