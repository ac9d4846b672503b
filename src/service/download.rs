//! One-shot artifact download with purge.
//!
//! A download streams the artifact out of the blob store and then deletes it.
//! The purge fires when the body is fully delivered or when the caller drops
//! the stream early. A read error from the store disarms it instead, so the
//! artifact and its record stay available for another attempt.

use super::NarrationService;
use crate::config::RetryConfig;
use crate::error::{OperationError, Result, StoreError};
use crate::registry::OperationRegistry;
use crate::retry::with_retry;
use crate::storage::{ArtifactBody, BlobStore};
use crate::types::{ArtifactLocator, OperationId, OperationState};
use bytes::Bytes;
use futures::stream::{Fuse, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A ready artifact, opened for streaming
#[derive(Debug)]
pub struct ArtifactDownload {
    /// Operation the artifact belongs to
    pub id: OperationId,
    /// Attachment filename (`{id}.{ext}`)
    pub filename: String,
    /// Content type of the artifact
    pub content_type: &'static str,
    /// Artifact bytes; purges the artifact once delivered or dropped
    pub body: ArtifactStream,
}

/// Artifact byte stream that purges the artifact when its outcome is known
pub struct ArtifactStream {
    id: OperationId,
    inner: Fuse<ArtifactBody>,
    primed: Option<Bytes>,
    purge: Option<PurgeHandle>,
    bytes_sent: u64,
}

#[derive(Clone, Copy, Debug)]
enum PurgeReason {
    Delivered,
    Aborted,
}

impl PurgeReason {
    fn as_str(&self) -> &'static str {
        match self {
            PurgeReason::Delivered => "delivered",
            PurgeReason::Aborted => "aborted",
        }
    }
}

struct PurgeHandle {
    id: OperationId,
    locator: ArtifactLocator,
    registry: OperationRegistry,
    store: Arc<dyn BlobStore>,
    retry: RetryConfig,
}

impl NarrationService {
    /// Open the artifact of a ready operation for a one-shot download
    ///
    /// Verifies the artifact still exists and reads its first chunk before
    /// returning, so a failing store surfaces here rather than mid-body.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the operation is unknown or another download already
    ///   finished with it
    /// - `NotReady` if the operation has not reached `Ready`
    /// - `ArtifactGone` if the artifact is missing; the record is retired
    /// - [`StoreError`] if the store cannot be queried or read; nothing is purged
    pub async fn download(&self, id: OperationId) -> Result<ArtifactDownload> {
        let record = self.registry.get(id).await?;

        if record.purge_claimed {
            return Err(OperationError::NotFound { id }.into());
        }
        if record.state != OperationState::Ready {
            return Err(OperationError::NotReady {
                id,
                state: record.state,
            }
            .into());
        }

        let locator = record.artifact_locator;

        let exists = self.store.exists(&locator).await.inspect_err(|e| {
            tracing::error!(operation_id = %id, locator = %locator, error = %e, "Failed to verify artifact");
        })?;

        if !exists {
            tracing::warn!(
                operation_id = %id,
                locator = %locator,
                "Artifact missing from store, retiring operation"
            );
            self.registry.remove(id).await;
            return Err(OperationError::ArtifactGone {
                id,
                locator: locator.uri(),
            }
            .into());
        }

        let mut inner = self
            .store
            .open_read(&locator)
            .await
            .inspect_err(|e| {
                tracing::error!(operation_id = %id, locator = %locator, error = %e, "Failed to open artifact");
            })?
            .fuse();

        let primed = match inner.next().await {
            Some(Ok(chunk)) => Some(chunk),
            Some(Err(e)) => {
                tracing::error!(operation_id = %id, locator = %locator, error = %e, "Failed to read artifact");
                return Err(e.into());
            }
            None => None,
        };

        tracing::info!(operation_id = %id, locator = %locator, "Streaming artifact");

        let encoding = self.config.synthesis.audio_encoding;
        Ok(ArtifactDownload {
            id,
            filename: format!("{}.{}", id, encoding.extension()),
            content_type: encoding.content_type(),
            body: ArtifactStream {
                id,
                inner,
                primed,
                purge: Some(PurgeHandle {
                    id,
                    locator,
                    registry: self.registry.clone(),
                    store: self.store.clone(),
                    retry: self.config.retry.clone(),
                }),
                bytes_sent: 0,
            },
        })
    }
}

impl Stream for ArtifactStream {
    type Item = std::result::Result<Bytes, StoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if let Some(chunk) = this.primed.take() {
            this.bytes_sent += chunk.len() as u64;
            return Poll::Ready(Some(Ok(chunk)));
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                if this.purge.take().is_some() {
                    tracing::error!(
                        operation_id = %this.id,
                        bytes_sent = this.bytes_sent,
                        error = %e,
                        "Artifact read failed mid-stream, keeping artifact for retry"
                    );
                }
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let Some(purge) = this.purge.take() {
                    purge.fire(PurgeReason::Delivered, this.bytes_sent);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ArtifactStream {
    fn drop(&mut self) {
        if let Some(purge) = self.purge.take() {
            purge.fire(PurgeReason::Aborted, self.bytes_sent);
        }
    }
}

impl std::fmt::Debug for ArtifactStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStream")
            .field("id", &self.id)
            .field("bytes_sent", &self.bytes_sent)
            .field("armed", &self.purge.is_some())
            .finish_non_exhaustive()
    }
}

impl PurgeHandle {
    fn fire(self, reason: PurgeReason, bytes_sent: u64) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.purge(reason, bytes_sent));
            }
            Err(_) => tracing::error!(
                operation_id = %self.id,
                locator = %self.locator,
                "No runtime available, artifact was not purged"
            ),
        }
    }

    async fn purge(self, reason: PurgeReason, bytes_sent: u64) {
        if !self.registry.claim_purge(self.id).await {
            tracing::debug!(operation_id = %self.id, "Artifact purge already claimed");
            return;
        }

        tracing::info!(
            operation_id = %self.id,
            reason = reason.as_str(),
            bytes_sent,
            "Purging artifact"
        );

        match with_retry(&self.retry, || self.store.delete(&self.locator)).await {
            Ok(()) => tracing::info!(operation_id = %self.id, locator = %self.locator, "Artifact purged"),
            Err(e) => tracing::error!(
                operation_id = %self.id,
                locator = %self.locator,
                error = %e,
                "Failed to purge artifact"
            ),
        }

        self.registry.remove(self.id).await;
    }
}
