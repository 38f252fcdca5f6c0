//! Generation executor and its collaborators.
//!
//! - [`GenerationProvider`]: produces image bytes from a prompt and credential
//! - [`BlobStore`]: durable write-once artifact storage
//! - [`GenerationExecutor`]: one provider round trip plus one blob write,
//!   bounded by a timeout

pub mod blob;
pub mod executor;
pub mod provider;

pub use blob::{BlobStore, FsBlobStore};
pub use executor::{artifact_key, Artifact, GenerationExecutor};
pub use provider::{GeneratedImage, GenerationError, GenerationProvider, HttpImageProvider};
