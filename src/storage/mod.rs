//! Artifact blob store
//!
//! - [`GcsBlobStore`]: Google Cloud Storage JSON API

mod gcs;
mod traits;

pub use gcs::GcsBlobStore;
pub use traits::{ArtifactBody, BlobStore};
