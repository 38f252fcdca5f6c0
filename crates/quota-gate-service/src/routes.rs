//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, byok, generate, health, posts, webhooks};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent generation requests.
/// Each one holds an outbound provider call for up to the generation timeout.
const GENERATE_MAX_CONCURRENT_REQUESTS: usize = 32;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /artifacts/{key}` - Generated artifacts
///
/// ## Generation (rate-limited)
/// - `POST /v1/generate` - Generate an artifact
/// - `POST /v1/byok` - Store or clear the user's provider key
///
/// ## Accounts
/// - `GET /v1/accounts/{user_id}` - Balance snapshot
/// - `GET /v1/accounts/{user_id}/ledger` - Consumption log
///
/// ## Posts
/// - `POST /v1/posts` - Schedule a post
/// - `GET /v1/posts/{id}` - Get a post
/// - `POST /v1/posts/{id}/requeue` - Re-enqueue a failed post
///
/// ## Webhooks and scheduler
/// - `POST /webhooks/stripe` - Stripe webhooks
/// - `POST /internal/publish/run` - Publish due posts now
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;
    let blob_dir = state.config.blob_dir.clone();

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let generate_routes = Router::new()
        .route("/", post(generate::generate))
        .layer(ConcurrencyLimitLayer::new(GENERATE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        .nest("/generate", generate_routes)
        .route("/byok", post(byok::save_byok))
        // Accounts
        .route("/accounts/:user_id", get(accounts::get_account))
        .route("/accounts/:user_id/ledger", get(accounts::list_ledger))
        // Posts
        .route("/posts", post(posts::create_post))
        .route("/posts/:post_id", get(posts::get_post))
        .route("/posts/:post_id/requeue", post(posts::requeue_post))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by external services)
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // External scheduler trigger
        .route("/internal/publish/run", post(posts::run_publish))
        .nest_service("/artifacts", ServeDir::new(blob_dir))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
