//! Shutdown coordination.

use crate::error::Result;

use super::NarrationService;

impl NarrationService {
    /// Gracefully shut down the service
    ///
    /// 1. Stops accepting new synthesis requests
    /// 2. Cancels every running poller
    /// 3. Waits for pollers to exit, bounded by `polling.shutdown_timeout`
    ///
    /// External jobs are left running and artifacts already written stay in
    /// the store; operation records are dropped with the service.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.pollers
            .accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        tracing::info!("Stopped accepting new synthesis requests");

        self.cancel_all_pollers().await;

        let shutdown_timeout = self.config.polling.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, self.wait_for_pollers()).await {
            Ok(()) => tracing::info!("All pollers stopped"),
            Err(_) => tracing::warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "Timeout waiting for pollers to stop, proceeding with shutdown"
            ),
        }

        tracing::info!(
            operations = self.registry.len().await,
            "Graceful shutdown complete"
        );
        Ok(())
    }

    /// Whether new synthesis requests are accepted
    pub fn is_accepting(&self) -> bool {
        self.pollers
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of pollers still running
    pub async fn active_pollers(&self) -> usize {
        self.pollers.active.lock().await.len()
    }

    async fn cancel_all_pollers(&self) {
        let active = self.pollers.active.lock().await;
        tracing::debug!(active_count = active.len(), "Cancelling all pollers");

        self.pollers.root.cancel();
        for (id, token) in active.iter() {
            tracing::debug!(operation_id = %id, "Signaling poller cancellation");
            token.cancel();
        }
    }

    async fn wait_for_pollers(&self) {
        loop {
            let active_count = self.active_pollers().await;
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for pollers to stop");
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}
