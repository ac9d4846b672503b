//! Shared test doubles and helpers for creating NarrationService instances in tests.

use crate::config::{Config, RetryConfig};
use crate::error::{StoreError, SupplierError};
use crate::service::NarrationService;
use crate::storage::{ArtifactBody, BlobStore};
use crate::synthesis::{JobStatus, JobSupplier};
use crate::types::{ArtifactLocator, JobHandle};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Job supplier answering from a script
///
/// Status results are consumed in order; the last one repeats once the
/// script runs out.
#[derive(Default)]
pub(crate) struct ScriptedSupplier {
    start_errors: Mutex<VecDeque<SupplierError>>,
    statuses: Mutex<VecDeque<Result<JobStatus, SupplierError>>>,
    started: Mutex<Vec<(String, ArtifactLocator)>>,
    status_calls: AtomicUsize,
}

impl ScriptedSupplier {
    pub(crate) fn with_statuses(
        statuses: impl IntoIterator<Item = Result<JobStatus, SupplierError>>,
    ) -> Self {
        let supplier = Self::default();
        supplier.statuses.lock().unwrap().extend(statuses);
        supplier
    }

    /// Fail the next `start` call with `error`
    pub(crate) fn fail_next_start(&self, error: SupplierError) {
        self.start_errors.lock().unwrap().push_back(error);
    }

    pub(crate) fn push_status(&self, status: Result<JobStatus, SupplierError>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub(crate) fn started(&self) -> Vec<(String, ArtifactLocator)> {
        self.started.lock().unwrap().clone()
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobSupplier for ScriptedSupplier {
    async fn start(
        &self,
        text: &str,
        destination: &ArtifactLocator,
    ) -> Result<JobHandle, SupplierError> {
        if let Some(error) = self.start_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut started = self.started.lock().unwrap();
        started.push((text.to_string(), destination.clone()));
        Ok(JobHandle(format!(
            "projects/test/locations/global/operations/{}",
            started.len()
        )))
    }

    async fn status(&self, _job: &JobHandle) -> Result<JobStatus, SupplierError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            statuses
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(JobStatus::running(None)))
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// In-memory blob store with failure injection
pub(crate) struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    chunk_size: usize,
    exists_error: Mutex<Option<StoreError>>,
    open_error: Mutex<Option<StoreError>>,
    /// Yield a read error after this many chunks
    fail_after_chunks: Mutex<Option<usize>>,
    deletes: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            chunk_size: 4,
            exists_error: Mutex::new(None),
            open_error: Mutex::new(None),
            fail_after_chunks: Mutex::new(None),
            deletes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn put(&self, locator: &ArtifactLocator, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(locator.uri(), data.to_vec());
    }

    pub(crate) fn contains(&self, locator: &ArtifactLocator) -> bool {
        self.objects.lock().unwrap().contains_key(&locator.uri())
    }

    pub(crate) fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_exists(&self, error: StoreError) {
        *self.exists_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn fail_open(&self, error: StoreError) {
        *self.open_error.lock().unwrap() = Some(error);
    }

    pub(crate) fn fail_reads_after(&self, chunks: usize) {
        *self.fail_after_chunks.lock().unwrap() = Some(chunks);
    }

    pub(crate) fn heal(&self) {
        *self.exists_error.lock().unwrap() = None;
        *self.open_error.lock().unwrap() = None;
        *self.fail_after_chunks.lock().unwrap() = None;
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn exists(&self, locator: &ArtifactLocator) -> Result<bool, StoreError> {
        if let Some(error) = self.exists_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.contains(locator))
    }

    async fn open_read(&self, locator: &ArtifactLocator) -> Result<ArtifactBody, StoreError> {
        if let Some(error) = self.open_error.lock().unwrap().clone() {
            return Err(error);
        }
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(&locator.uri())
            .cloned()
            .ok_or_else(|| StoreError::Rejected {
                status: 404,
                message: "No such object".into(),
            })?;

        let mut items: Vec<Result<Bytes, StoreError>> = data
            .chunks(self.chunk_size)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        if let Some(after) = *self.fail_after_chunks.lock().unwrap() {
            items.truncate(after);
            items.push(Err(StoreError::Read("connection reset by peer".into())));
        }

        Ok(futures::stream::iter(items).boxed())
    }

    async fn delete(&self, locator: &ArtifactLocator) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().remove(&locator.uri());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Configuration with both required settings present and fast timings
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.storage.bucket = Some("test-bucket".into());
    config.synthesis.parent = Some("projects/test/locations/global".into());
    config.polling.interval = Duration::from_millis(20);
    config.polling.shutdown_timeout = Duration::from_secs(5);
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// Helper to create a test NarrationService around the given doubles
pub(crate) fn create_test_service(
    supplier: Arc<ScriptedSupplier>,
    store: Arc<MemoryStore>,
) -> NarrationService {
    NarrationService::with_collaborators(test_config(), supplier, store)
}

/// Poll `condition` until it holds, panicking after ten seconds
pub(crate) async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
