//! Google Cloud Storage blob store over the JSON API

use super::traits::{ArtifactBody, BlobStore};
use crate::config::GoogleConfig;
use crate::error::StoreError;
use crate::retry::{is_transient_status, is_transient_transport};
use crate::types::ArtifactLocator;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::StatusCode;
use std::time::Duration;

/// Blob store backed by `storage/v1` object endpoints
pub struct GcsBlobStore {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
    request_timeout: Duration,
}

impl GcsBlobStore {
    /// Create a store from configuration
    ///
    /// The client has no overall timeout so long artifact bodies can stream;
    /// metadata and delete requests apply `request_timeout` individually.
    pub fn new(google: &GoogleConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(google.request_timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: google.storage_endpoint.trim_end_matches('/').to_string(),
            access_token: google.access_token.clone(),
            request_timeout: google.request_timeout,
        })
    }

    fn object_url(&self, locator: &ArtifactLocator) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            urlencoding::encode(&locator.bucket),
            urlencoding::encode(&locator.object)
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn exists(&self, locator: &ArtifactLocator) -> Result<bool, StoreError> {
        let response = self
            .request(reqwest::Method::GET, &self.object_url(locator))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(status_error(status, response).await),
        }
    }

    async fn open_read(&self, locator: &ArtifactLocator) -> Result<ArtifactBody, StoreError> {
        let response = self
            .request(reqwest::Method::GET, &self.object_url(locator))
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        tracing::debug!(
            locator = %locator,
            content_length = ?response.content_length(),
            "Opened artifact for streaming"
        );

        Ok(response
            .bytes_stream()
            .map_err(|e| StoreError::Read(e.to_string()))
            .boxed())
    }

    async fn delete(&self, locator: &ArtifactLocator) -> Result<(), StoreError> {
        let response = self
            .request(reqwest::Method::DELETE, &self.object_url(locator))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                tracing::debug!(locator = %locator, "Artifact already deleted");
                Ok(())
            }
            status => Err(status_error(status, response).await),
        }
    }

    fn name(&self) -> &'static str {
        "gcs"
    }
}

fn transport_error(error: reqwest::Error) -> StoreError {
    if is_transient_transport(&error) {
        StoreError::Unavailable(error.to_string())
    } else {
        StoreError::Read(error.to_string())
    }
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> StoreError {
    let message = response.text().await.unwrap_or_default();
    if is_transient_status(status) {
        StoreError::Unavailable(format!("{}: {}", status, message))
    } else {
        StoreError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}
