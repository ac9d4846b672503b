//! Per-operation progress stream.

use super::parse_operation_id;
use crate::api::AppState;
use axum::{
    extract::{Path, State},
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use std::convert::Infallible;
use tokio_stream::StreamExt;

/// GET /api/events/:id - Server-sent progress events for one operation
///
/// The stream opens with `connected`, then a catch-up event for operations
/// that already made progress. It closes after `complete` or `error`.
#[utoipa::path(
    get,
    path = "/api/events/{id}",
    tag = "narration",
    params(
        ("id" = String, Path, description = "Operation ID")
    ),
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream", body = crate::types::ProgressEvent),
        (status = 404, description = "Operation not found", body = crate::error::ApiError)
    )
)]
pub async fn operation_events(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let id = match parse_operation_id(&raw) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let subscription = match state.service.subscribe(id).await {
        Ok(subscription) => subscription,
        Err(e) => return e.into_response(),
    };
    tracing::debug!(operation_id = %id, "Progress subscriber connected");

    let sse_stream = subscription
        .into_events()
        .filter_map(|event| match serde_json::to_string(&event) {
            Ok(json_data) => Some(Ok::<_, Infallible>(
                SseEvent::default().event(event.name()).data(json_data),
            )),
            Err(e) => {
                tracing::warn!("Failed to serialize progress event to JSON: {}", e);
                None
            }
        });

    Sse::new(sse_stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
