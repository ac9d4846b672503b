//! narration-relay server
//!
//! Reads configuration from the environment (and `.env`), serves the REST API
//! and shuts down gracefully on SIGTERM / SIGINT.

use narration_relay::{Config, NarrationService, run_with_shutdown};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("narration_relay=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    for key in config.missing_required() {
        tracing::warn!(key, "Required setting is missing; narration requests will fail until it is set");
    }

    let service = Arc::new(NarrationService::new(config)?);
    let api = service.spawn_api_server();

    tokio::select! {
        result = api => {
            match result {
                Ok(Ok(())) => tracing::info!("API server exited"),
                Ok(Err(e)) => tracing::error!(error = %e, "API server failed"),
                Err(e) => tracing::error!(error = %e, "API server task panicked"),
            }
            service.shutdown().await?;
        }
        result = run_with_shutdown(&service) => result?,
    }

    Ok(())
}
