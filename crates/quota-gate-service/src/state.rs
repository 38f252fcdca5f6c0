//! Application state.

use std::sync::Arc;
use std::time::Duration;

use quota_gate_store::RocksStore;

use crate::config::ServiceConfig;
use crate::deposit::DepositHandler;
use crate::dispatch::QuotaDispatcher;
use crate::generation::{
    BlobStore, FsBlobStore, GenerationError, GenerationExecutor, GenerationProvider,
    HttpImageProvider,
};
use crate::publish::{FacebookPublisher, PublishError, PublishRunner, SocialPublisher};

/// Errors building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Generation provider client could not be built.
    #[error("generation provider: {0}")]
    Generation(#[from] GenerationError),

    /// Publisher client could not be built.
    #[error("publisher: {0}")]
    Publish(#[from] PublishError),
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Generation pipeline.
    pub dispatcher: Arc<QuotaDispatcher>,

    /// Payment application.
    pub deposits: Arc<DepositHandler>,

    /// Scheduled publishing.
    pub runner: Arc<PublishRunner>,
}

impl AppState {
    /// Create the application state with the HTTP-backed collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured outbound URL is invalid.
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Result<Self, StateError> {
        let provider = HttpImageProvider::new(
            &config.generation_base_url,
            Duration::from_secs(config.generation_timeout_seconds),
        )?;
        let blobs = FsBlobStore::new(&config.blob_dir, &config.public_base_url);
        let publisher = FacebookPublisher::new(
            &config.graph_api_url,
            Duration::from_secs(config.publish_timeout_seconds),
        )?;

        if config.system_generation_key.is_none() {
            tracing::warn!("System generation key not configured - TRIAL and CREDIT requests go out unauthenticated");
        }

        Ok(Self::from_parts(
            store,
            config,
            Arc::new(provider),
            Arc::new(blobs),
            Arc::new(publisher),
        ))
    }

    /// Create the application state from explicit collaborators.
    #[must_use]
    pub fn from_parts(
        store: Arc<RocksStore>,
        config: ServiceConfig,
        provider: Arc<dyn GenerationProvider>,
        blobs: Arc<dyn BlobStore>,
        publisher: Arc<dyn SocialPublisher>,
    ) -> Self {
        let executor = GenerationExecutor::new(
            provider,
            blobs,
            config.system_generation_key.clone(),
            Duration::from_secs(config.generation_timeout_seconds),
        );
        let dispatcher =
            QuotaDispatcher::new(store.clone(), executor, config.generation_cost_credits);
        let deposits = DepositHandler::new(store.clone());
        let runner = PublishRunner::new(
            store.clone(),
            publisher,
            config.publish_batch_size,
            config.publish_concurrency,
            Duration::from_secs(config.publish_timeout_seconds),
        );

        Self {
            store,
            config,
            dispatcher: Arc::new(dispatcher),
            deposits: Arc::new(deposits),
            runner: Arc::new(runner),
        }
    }
}
