use super::test_helpers::{
    MemoryStore, ScriptedSupplier, create_test_service, test_config, wait_until,
};
use super::*;
use crate::error::{Error, OperationError, StoreError, SupplierError};
use crate::synthesis::JobStatus;
use crate::types::{OperationState, ProgressEvent};
use futures::StreamExt;


/// Service whose supplier answers with `statuses`, plus handles to both doubles
fn service_with(
    statuses: Vec<std::result::Result<JobStatus, SupplierError>>,
) -> (NarrationService, Arc<ScriptedSupplier>, Arc<MemoryStore>) {
    let supplier = Arc::new(ScriptedSupplier::with_statuses(statuses));
    let store = Arc::new(MemoryStore::new());
    let service = create_test_service(supplier.clone(), store.clone());
    (service, supplier, store)
}

async fn wait_for_state(service: &NarrationService, id: OperationId, state: OperationState) {
    wait_until(|| async {
        service
            .operation(id)
            .await
            .map(|r| r.state == state)
            .unwrap_or(false)
    })
    .await;
}

async fn wait_for_retired(service: &NarrationService, id: OperationId) {
    wait_until(|| async { service.operation(id).await.is_err() }).await;
}

/// Like [`service_with`] but polling every `interval_ms`
fn service_polling_every(
    interval_ms: u64,
    statuses: Vec<std::result::Result<JobStatus, SupplierError>>,
) -> (NarrationService, Arc<ScriptedSupplier>, Arc<MemoryStore>) {
    let supplier = Arc::new(ScriptedSupplier::with_statuses(statuses));
    let store = Arc::new(MemoryStore::new());
    let mut config = test_config();
    config.polling.interval = std::time::Duration::from_millis(interval_ms);
    let service = NarrationService::with_collaborators(config, supplier.clone(), store.clone());
    (service, supplier, store)
}
