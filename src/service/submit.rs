//! Request validation and job start.

use super::NarrationService;
use super::poller::PollerParams;
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::types::{ArtifactLocator, OperationId, OperationRecord};

/// An accepted synthesis request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    /// ID of the new operation
    pub id: OperationId,
    /// Relative URL of its progress event stream
    pub events_url: String,
}

impl NarrationService {
    /// Accept a synthesis request
    ///
    /// Validates the text, starts the external job (retrying transient
    /// supplier failures), registers a `Pending` record and spawns its poller.
    /// The artifact is written to `gs://{bucket}/{id}.{ext}`.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun
    /// - [`Error::Validation`] if the text is empty after trimming
    /// - [`Error::Config`] if the bucket or job parent is not configured
    /// - [`Error::Supplier`] if the job could not be started
    pub async fn submit(&self, text: &str) -> Result<Submission> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        // Whitespace-only text is rejected, but accepted text is forwarded as given
        if text.trim().is_empty() {
            return Err(Error::Validation("Text is required.".into()));
        }

        let bucket = self.config.require_bucket()?;
        self.config.require_parent()?;

        let id = OperationId::new();
        let locator = ArtifactLocator::new(
            bucket,
            format!(
                "{}.{}",
                id,
                self.config.synthesis.audio_encoding.extension()
            ),
        );

        tracing::info!(
            operation_id = %id,
            destination = %locator,
            text_len = text.len(),
            supplier = self.supplier.name(),
            "Starting synthesis job"
        );

        let job = with_retry(&self.config.retry, || self.supplier.start(text, &locator))
            .await
            .inspect_err(|e| {
                tracing::error!(operation_id = %id, error = %e, "Failed to start synthesis job");
            })?;

        self.registry
            .insert(OperationRecord::new(id, job.clone(), locator))
            .await?;

        tracing::info!(operation_id = %id, job = %job, "Synthesis job started");

        self.spawn_poller(PollerParams { id, job }).await;

        Ok(Submission {
            id,
            events_url: id.events_path(),
        })
    }
}
