//! System handlers: status and OpenAPI.

use super::StatusResponse;
use axum::{Json, response::IntoResponse};

/// GET /api/status - Liveness check
#[utoipa::path(
    get,
    path = "/api/status",
    tag = "system",
    responses(
        (status = 200, description = "Backend is running", body = StatusResponse)
    )
)]
pub async fn status() -> impl IntoResponse {
    Json(StatusResponse {
        status: "Backend is running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// GET /api/openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/api/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI 3.1 specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}
