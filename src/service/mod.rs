//! Narration service split into focused submodules.
//!
//! The `NarrationService` struct and its methods are organized by concern:
//! - [`submit`] - Request validation and job start
//! - [`poller`] - Per-operation status polling
//! - [`download`] - One-shot artifact download with purge
//! - [`lifecycle`] - Shutdown coordination

mod download;
mod lifecycle;
mod poller;
mod submit;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use download::{ArtifactDownload, ArtifactStream};
pub use submit::Submission;

use crate::config::Config;
use crate::error::Result;
use crate::registry::{OperationRegistry, Subscription};
use crate::storage::{BlobStore, GcsBlobStore};
use crate::synthesis::{GoogleLongAudioSynthesizer, JobSupplier};
use crate::types::{OperationId, OperationRecord};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio_util::sync::CancellationToken;

/// Active poller tracking
#[derive(Clone)]
pub(crate) struct PollerSet {
    /// Cancellation token per running poller, removed when the poller exits
    pub(crate) active: Arc<tokio::sync::Mutex<HashMap<OperationId, CancellationToken>>>,
    /// Parent of every poller token; cancelled on shutdown
    pub(crate) root: CancellationToken,
    /// Flag to indicate whether new requests are accepted (false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl PollerSet {
    fn new() -> Self {
        Self {
            active: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            root: CancellationToken::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
        }
    }
}

/// Main relay instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct NarrationService {
    /// Operation registry (sole owner of operation state)
    pub(crate) registry: OperationRegistry,
    /// External synthesis job supplier
    pub(crate) supplier: Arc<dyn JobSupplier>,
    /// Blob store holding finished artifacts
    pub(crate) store: Arc<dyn BlobStore>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Running pollers
    pub(crate) pollers: PollerSet,
}

impl NarrationService {
    /// Create a service talking to Google Cloud Text-to-Speech and Cloud Storage
    ///
    /// Missing bucket or parent settings are not an error here; requests that
    /// need them fail with a configuration error instead.
    pub fn new(config: Config) -> Result<Self> {
        let supplier = GoogleLongAudioSynthesizer::new(&config.google, &config.synthesis)?;
        let store = GcsBlobStore::new(&config.google)?;

        tracing::info!(
            supplier = supplier.name(),
            store = store.name(),
            tts_endpoint = %config.google.tts_endpoint,
            storage_endpoint = %config.google.storage_endpoint,
            "Collaborators initialized"
        );

        Ok(Self::with_collaborators(
            config,
            Arc::new(supplier),
            Arc::new(store),
        ))
    }

    /// Create a service with explicit collaborators
    pub fn with_collaborators(
        config: Config,
        supplier: Arc<dyn JobSupplier>,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            registry: OperationRegistry::new(config.polling.event_buffer),
            supplier,
            store,
            config: Arc::new(config),
            pollers: PollerSet::new(),
        }
    }

    /// Subscribe to progress events of one operation
    ///
    /// Only one subscriber per operation is kept; a new subscription ends the
    /// previous one. Dropping the receiver never affects the operation.
    pub async fn subscribe(&self, id: OperationId) -> Result<Subscription> {
        self.registry.subscribe(id).await
    }

    /// Current snapshot of an operation
    pub async fn operation(&self, id: OperationId) -> Result<OperationRecord> {
        self.registry.get(id).await
    }

    /// The operation registry
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server listens on the configured bind address (default: 0.0.0.0:3001).
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let service = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(service, config).await })
    }
}
