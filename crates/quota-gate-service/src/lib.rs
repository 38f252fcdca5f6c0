//! Quota-gate HTTP API service.
//!
//! This crate provides the HTTP gateway for metered content generation:
//!
//! - Generation funded by trial allotment, prepaid credits or the user's own key
//! - Idempotent crediting of confirmed Stripe payments
//! - Account and consumption log inspection
//! - Scheduled social posts with a background publish runner
//!
//! Authentication and payment signature verification happen upstream of
//! this service.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers with no await stay async for the router

pub mod config;
pub mod deposit;
pub mod dispatch;
pub mod error;
pub mod generation;
pub mod handlers;
pub mod publish;
pub mod routes;
pub mod state;

#[cfg(test)]
mod test_support;

pub use config::ServiceConfig;
pub use deposit::{Deposit, DepositHandler, DepositOutcome};
pub use dispatch::{DispatchError, DispatchOutcome, QuotaDispatcher, MAX_PROMPT_CHARS};
pub use error::ApiError;
pub use generation::{
    BlobStore, FsBlobStore, GeneratedImage, GenerationError, GenerationExecutor,
    GenerationProvider, HttpImageProvider,
};
pub use publish::{
    spawn_publish_loop, FacebookPublisher, PublishError, PublishRunner, RunReport,
    SocialPublisher,
};
pub use routes::create_router;
pub use state::{AppState, StateError};
