//! Traits and types for the synthesis job supplier

use crate::error::SupplierError;
use crate::types::{ArtifactLocator, JobHandle};
use async_trait::async_trait;

/// Status of an external synthesis job as reported by the supplier
#[must_use]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStatus {
    /// The job has finished (successfully or not)
    pub done: bool,
    /// Job-reported failure, present only when `done`
    pub error: Option<String>,
    /// Supplier-reported progress (0-100), if it reported any
    pub progress_percent: Option<u8>,
}

impl JobStatus {
    /// Still running, with optional progress
    pub fn running(progress_percent: Option<u8>) -> Self {
        Self {
            done: false,
            error: None,
            progress_percent,
        }
    }

    /// Finished successfully
    pub fn succeeded() -> Self {
        Self {
            done: true,
            error: None,
            progress_percent: Some(100),
        }
    }

    /// Finished with a job-reported error
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            done: true,
            error: Some(message.into()),
            progress_percent: None,
        }
    }
}

/// Trait for an external long-running synthesis job supplier
///
/// Implementations must classify failures: [`SupplierError::Unavailable`]
/// marks a transient query failure that the poller retries on its next tick;
/// every other variant is unrecoverable and fails the operation.
#[async_trait]
pub trait JobSupplier: Send + Sync {
    /// Start synthesizing `text`, writing the artifact to `destination`
    ///
    /// Returns the handle used for subsequent status queries.
    async fn start(
        &self,
        text: &str,
        destination: &ArtifactLocator,
    ) -> Result<JobHandle, SupplierError>;

    /// Query the current status of a job
    async fn status(&self, job: &JobHandle) -> Result<JobStatus, SupplierError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
