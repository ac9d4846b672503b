//! REST API server module
//!
//! Exposes narration requests, per-operation progress streams and one-shot
//! artifact downloads over HTTP, with an OpenAPI 3.1 description.

use crate::{Config, NarrationService, Result};
use axum::{Router, http::HeaderValue, routing::get, routing::post};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Narration
/// - `POST /api/generate-audio` - Start a synthesis job
/// - `GET /api/events/:id` - Server-sent progress events
/// - `GET /api/download/:id` - Download the artifact (one shot)
/// - `GET /api/operations/:id` - Inspect an operation
///
/// ## System
/// - `GET /api/status` - Liveness check
/// - `GET /api/openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(service: Arc<NarrationService>, config: Arc<Config>) -> Router {
    let state = AppState::new(service, config.clone());

    let router = Router::new()
        // Narration
        .route("/api/generate-audio", post(routes::generate_audio))
        .route("/api/events/:id", get(routes::operation_events))
        .route("/api/download/:id", get(routes::download_audio))
        .route("/api/operations/:id", get(routes::get_operation))
        // System
        .route("/api/status", get(routes::status))
        .route("/api/openapi.json", get(routes::openapi_spec));

    // SwaggerUi serves its own copy of the document, so it needs a path that
    // does not collide with /api/openapi.json
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops, either due to an error or because the task
/// serving it is aborted.
///
/// # Example
///
/// ```no_run
/// use narration_relay::{Config, NarrationService};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::from_env()?;
/// let service = Arc::new(NarrationService::new(config.clone())?);
///
/// narration_relay::api::start_api_server(service, Arc::new(config)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(service: Arc<NarrationService>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(service, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
