//! Common test utilities for quota-gate integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;

use quota_gate_core::{ScheduledPost, UserId};
use quota_gate_service::{
    create_router, AppState, FsBlobStore, GeneratedImage, GenerationError, GenerationProvider,
    PublishError, ServiceConfig, SocialPublisher,
};
use quota_gate_store::RocksStore;

/// Public base URL used in artifact references.
pub const PUBLIC_BASE_URL: &str = "http://gateway.test";

/// Generation provider returning a fixed image, or failing on demand.
#[derive(Default)]
pub struct StubProvider {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
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
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError::Provider("HTTP 503: unavailable".into()));
        }
        Ok(GeneratedImage {
            bytes: vec![0xff, 0xd8, 0xff, 0xe0],
            content_type: "image/jpeg".into(),
        })
    }
}

/// Publisher that rejects posts for page `"broken-page"`.
#[derive(Default)]
pub struct StubPublisher {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SocialPublisher for StubPublisher {
    async fn publish(&self, post: &ScheduledPost) -> Result<String, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if post.facebook_page_id == "broken-page" {
            return Err(PublishError::Platform {
                status: 400,
                message: "(#200) Permissions error".into(),
            });
        }
        Ok(format!("{}_{}", post.facebook_page_id, post.id))
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct store access for assertions.
    pub store: Arc<RocksStore>,
    /// Generation provider stub.
    pub provider: Arc<StubProvider>,
    /// Publisher stub.
    pub publisher: Arc<StubPublisher>,
    /// Shared application state.
    pub state: AppState,
    /// Temporary directory for the database and blobs (kept alive for test duration).
    pub _temp_dir: TempDir,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let data_dir = temp_dir.path().join("db");
        let blob_dir = temp_dir.path().join("artifacts");
        let store = Arc::new(RocksStore::open(&data_dir).expect("Failed to open store"));

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: data_dir.to_string_lossy().to_string(),
            blob_dir: blob_dir.to_string_lossy().to_string(),
            public_base_url: PUBLIC_BASE_URL.into(),
            system_generation_key: Some("system-key".into()),
            generation_timeout_seconds: 5,
            publish_timeout_seconds: 5,
            publish_interval_seconds: 0,
            request_timeout_seconds: 30,
            ..ServiceConfig::default()
        };

        let provider = Arc::new(StubProvider::default());
        let publisher = Arc::new(StubPublisher::default());
        let blobs = Arc::new(FsBlobStore::new(&blob_dir, PUBLIC_BASE_URL));

        let state = AppState::from_parts(
            store.clone(),
            config,
            provider.clone(),
            blobs,
            publisher.clone(),
        );
        let router: Router = create_router(state.clone());

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            provider,
            publisher,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Make the generation provider fail from now on.
    pub fn fail_generation(&self) {
        self.provider.fail.store(true, Ordering::SeqCst);
    }

    /// Number of generation provider calls so far.
    pub fn provider_calls(&self) -> usize {
        self.provider.calls.load(Ordering::SeqCst)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a test user id.
pub fn user(id: &str) -> UserId {
    UserId::new(id).expect("valid user id")
}
