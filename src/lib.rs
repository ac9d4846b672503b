//! # narration-relay
//!
//! Long-form text-to-speech relay. Accepts text, starts an external long-audio
//! synthesis job that writes its result to a blob store, streams progress to
//! one subscriber per operation, and hands the finished audio out exactly once
//! before purging it.
//!
//! ## Design Philosophy
//!
//! - **Stateless across restarts** - Operations live in memory only
//! - **One shot** - An artifact is deleted as soon as it has been downloaded
//! - **Decoupled polling** - Each operation is polled on its own task whether or
//!   not anyone is listening
//! - **Pluggable collaborators** - The job supplier and blob store are traits
//!
//! ## Quick Start
//!
//! ```no_run
//! use narration_relay::{Config, NarrationService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let service = NarrationService::new(config)?;
//!
//!     let submission = service.submit("It was a dark and stormy night.").await?;
//!     let mut events = service.subscribe(submission.id).await?.into_events();
//!
//!     use futures::StreamExt;
//!     while let Some(event) = events.next().await {
//!         println!("{}: {:?}", event.name(), event);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// In-memory operation registry
pub mod registry;
/// Retry logic with exponential backoff
pub mod retry;
/// Narration service (submission, polling, download, shutdown)
pub mod service;
/// Blob store adapters
pub mod storage;
/// Synthesis job suppliers
pub mod synthesis;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{AudioEncoding, Config};
pub use error::{
    ApiError, Error, ErrorDetail, OperationError, Result, StoreError, SupplierError,
    ToHttpStatus,
};
pub use registry::{OperationRegistry, Subscription};
pub use service::{ArtifactDownload, ArtifactStream, NarrationService, Submission};
pub use storage::{BlobStore, GcsBlobStore};
pub use synthesis::{GoogleLongAudioSynthesizer, JobStatus, JobSupplier};
pub use types::{
    ArtifactLocator, JobHandle, OperationId, OperationRecord, OperationState, ProgressEvent,
};

/// Helper function to run the service with graceful signal handling.
///
/// Waits for a termination signal and then calls the service's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use narration_relay::{Config, NarrationService, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = Arc::new(NarrationService::new(Config::from_env()?)?);
///     let _api = service.spawn_api_server();
///
///     run_with_shutdown(&service).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(service: &NarrationService) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
