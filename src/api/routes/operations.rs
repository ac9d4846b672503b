//! Operation inspection.

use super::parse_operation_id;
use crate::api::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET /api/operations/:id - Current snapshot of an operation
#[utoipa::path(
    get,
    path = "/api/operations/{id}",
    tag = "narration",
    params(
        ("id" = String, Path, description = "Operation ID")
    ),
    responses(
        (status = 200, description = "Operation snapshot", body = crate::types::OperationRecord),
        (status = 404, description = "Operation not found", body = crate::error::ApiError)
    )
)]
pub async fn get_operation(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let id = match parse_operation_id(&raw) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.service.operation(id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => e.into_response(),
    }
}
