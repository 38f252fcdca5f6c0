//! Quota-gate service - metered generation gateway and scheduled publisher.
//!
//! This is the main entry point for the quota-gate service.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quota_gate_service::{create_router, spawn_publish_loop, AppState, ServiceConfig};
use quota_gate_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,quota_gate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting quota-gate service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        blob_dir = %config.blob_dir,
        generation_cost_credits = config.generation_cost_credits,
        system_key_configured = config.system_generation_key.is_some(),
        publish_interval_seconds = config.publish_interval_seconds,
        "Service configuration loaded"
    );

    // Initialize RocksDB store
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    tokio::fs::create_dir_all(&config.blob_dir).await?;

    // Build app state
    let state = AppState::new(store, config.clone())?;

    if config.publish_interval_seconds > 0 {
        spawn_publish_loop(
            state.runner.clone(),
            Duration::from_secs(config.publish_interval_seconds),
        );
    } else {
        tracing::warn!("Publish loop disabled - due posts are only published via /internal/publish/run");
    }

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
