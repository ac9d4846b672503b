//! Per-operation status polling.

use super::NarrationService;
use crate::error::{Error, OperationError, SupplierError};
use crate::retry::IsRetryable;
use crate::synthesis::JobStatus;
use crate::types::{JobHandle, OperationId, OperationRecord, OperationState};
use tokio_util::sync::CancellationToken;

/// Parameters for spawning a poller
pub(crate) struct PollerParams {
    /// Operation to advance
    pub id: OperationId,
    /// External job to query
    pub job: JobHandle,
}

impl NarrationService {
    /// Spawn the polling task for an operation
    ///
    /// The task queries the supplier once per polling interval and applies
    /// the result through the registry. It stops when the record reaches a
    /// terminal state, when the record is retired, or when cancelled.
    pub(crate) async fn spawn_poller(&self, params: PollerParams) -> tokio::task::JoinHandle<()> {
        let PollerParams { id, job } = params;
        let cancel_token = self.pollers.root.child_token();

        self.pollers
            .active
            .lock()
            .await
            .insert(id, cancel_token.clone());

        let service = self.clone();
        tokio::spawn(async move {
            service.run_poller(id, job, cancel_token).await;
            service.pollers.active.lock().await.remove(&id);
        })
    }

    async fn run_poller(&self, id: OperationId, job: JobHandle, cancel_token: CancellationToken) {
        let period = self.config.polling.interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::debug!(operation_id = %id, interval_ms = period.as_millis(), "Poller started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = cancel_token.cancelled() => {
                    tracing::debug!(operation_id = %id, "Poller cancelled");
                    return;
                }
            }

            let outcome = tokio::select! {
                result = self.supplier.status(&job) => result,
                _ = cancel_token.cancelled() => {
                    tracing::debug!(operation_id = %id, "Poller cancelled during status query");
                    return;
                }
            };

            match &outcome {
                Ok(status) => tracing::debug!(
                    operation_id = %id,
                    done = status.done,
                    progress = ?status.progress_percent,
                    "Status query succeeded"
                ),
                Err(e) if e.is_retryable() => tracing::warn!(
                    operation_id = %id,
                    error = %e,
                    "Status query failed, will retry on next tick"
                ),
                Err(e) => tracing::error!(
                    operation_id = %id,
                    error = %e,
                    "Status query rejected, will retry on next tick"
                ),
            }

            match self.registry.update(id, |record| advance(record, &outcome)).await {
                Ok(record) => match record.state {
                    OperationState::Ready => {
                        tracing::info!(operation_id = %id, "Synthesis complete, artifact ready");
                        return;
                    }
                    OperationState::Failed => {
                        tracing::info!(
                            operation_id = %id,
                            error = record.last_error.as_deref().unwrap_or_default(),
                            "Synthesis failed"
                        );
                        return;
                    }
                    OperationState::Pending
                    | OperationState::Running
                    | OperationState::PollingError => {}
                },
                Err(Error::Operation(OperationError::NotFound { .. })) => {
                    tracing::debug!(operation_id = %id, "Operation retired, poller stopping");
                    return;
                }
                Err(e) => {
                    tracing::warn!(operation_id = %id, error = %e, "Poller stopping");
                    return;
                }
            }
        }
    }
}

/// Advance a record with the outcome of one status query
///
/// Terminal records are left untouched. Only the job itself can fail the
/// operation: any failed status query moves a `Running` record to
/// `PollingError` and is ignored while the record is still `Pending`.
pub(crate) fn advance(record: &mut OperationRecord, outcome: &Result<JobStatus, SupplierError>) {
    if record.state.is_terminal() {
        return;
    }

    match outcome {
        Ok(status) if status.done => match &status.error {
            Some(message) => {
                record.state = OperationState::Failed;
                record.last_error = Some(message.clone());
            }
            None => {
                record.state = OperationState::Ready;
                record.progress_percent = 100;
                record.last_error = None;
            }
        },
        Ok(status) => {
            match status.progress_percent.filter(|p| *p > 0) {
                Some(reported) => {
                    record.progress_percent = record.progress_percent.max(reported.min(100));
                }
                // Liveness nudge for suppliers that report no progress
                None if record.state == OperationState::Pending && record.progress_percent == 0 => {
                    record.progress_percent = 1;
                }
                None => {}
            }
            record.state = OperationState::Running;
            record.last_error = None;
        }
        // A failed query says nothing about the job; only the job ends the operation
        Err(e) => {
            if record.state != OperationState::Pending {
                record.state = OperationState::PollingError;
                record.last_error = Some(e.to_string());
            }
        }
    }
}
