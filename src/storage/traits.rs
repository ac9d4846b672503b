//! Traits for the artifact blob store

use crate::error::StoreError;
use crate::types::ArtifactLocator;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Byte stream of an artifact body
pub type ArtifactBody = BoxStream<'static, Result<Bytes, StoreError>>;

/// Trait for the store holding synthesized artifacts
///
/// The relay only reads and deletes; the synthesis job writes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether the artifact currently exists
    async fn exists(&self, locator: &ArtifactLocator) -> Result<bool, StoreError>;

    /// Open the artifact for streaming
    ///
    /// Errors before the first byte are returned here; errors mid-body are
    /// yielded by the stream.
    async fn open_read(&self, locator: &ArtifactLocator) -> Result<ArtifactBody, StoreError>;

    /// Delete the artifact
    ///
    /// Deleting an artifact that is already gone succeeds.
    async fn delete(&self, locator: &ArtifactLocator) -> Result<(), StoreError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
