//! Scheduled publishing.
//!
//! The runner scans pending posts whose time has come, publishes each one
//! through a [`SocialPublisher`] and records `published` or `failed`. Failed
//! posts are never retried automatically.

pub mod facebook;
pub mod runner;

pub use facebook::{FacebookPublisher, PublishError, SocialPublisher};
pub use runner::{spawn_publish_loop, PublishRunner, RunReport};
