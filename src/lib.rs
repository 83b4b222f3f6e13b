//! # Batchbox
//!
//! A unified batch generation client for heterogeneous AI media APIs
//! (image/text/video/audio), built around four ideas:
//!
//! - **Hierarchical configuration**: every per-call setting resolves through
//!   mode → endpoint → provider → system default, flattened exactly once into
//!   an immutable [`config::ResolvedConfig`].
//! - **Protocol adapters**: one request builder / response parser pair per
//!   wire format (OpenAI-compatible and Gemini-style), selected per endpoint.
//! - **Endpoint selection with failover**: per-model priority lists with
//!   manual, round-robin and failover selection, bounded retries and
//!   exponential backoff.
//! - **Concurrent batches**: semaphore-bounded fan-out with
//!   submission-ordered results, partial-failure tolerance and
//!   fingerprint-based dedup of identical calls.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use batchbox::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), batchbox::Error> {
//!     let snapshot = ConfigSnapshot::from_yaml_files(
//!         std::path::Path::new("api_config.yaml"),
//!         Some(std::path::Path::new("secrets.yaml")),
//!     )?;
//!     let client = BatchboxClient::builder().config(snapshot).build()?;
//!
//!     let response = client
//!         .generate(
//!             GenerationRequest::new("sketchwave", "a lighthouse at dusk")
//!                 .with_batch_count(4)
//!                 .with_seed(42),
//!         )
//!         .await?;
//!
//!     for (index, item) in response.items.iter().enumerate() {
//!         match item {
//!             Ok(success) => println!("item {index}: {} artifact(s)", success.artifacts.len()),
//!             Err(e) => println!("item {index} failed: {e}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod observability;
pub mod orchestrator;
pub mod request;
pub mod response;
pub mod retry;
pub mod selection;
pub mod types;
pub mod utils;

pub use error::Error;

/// Convenience re-exports for typical hosts.
pub mod prelude {
    pub use crate::account::{AccountService, StaticAccountService};
    pub use crate::cache::Fingerprint;
    pub use crate::client::{BatchboxClient, BatchboxClientBuilder};
    pub use crate::config::{ConfigSnapshot, ResolvedConfig};
    pub use crate::error::Error;
    pub use crate::orchestrator::{BatchHooks, GenerationRequest, GenerationResponse};
    pub use crate::retry::RetryPolicy;
    pub use crate::selection::SelectionMode;
    pub use crate::types::{
        Artifact, ArtifactData, Asset, FileFormat, ItemOutcome, ItemSuccess, OperationMode,
    };
    pub use crate::utils::cancel::CancelHandle;
}
