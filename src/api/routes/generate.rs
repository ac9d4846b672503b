//! Narration request handler.

use super::{GenerateAudioRequest, GenerateAudioResponse};
use crate::api::AppState;
use crate::error::Error;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /api/generate-audio - Start a long-form synthesis job
#[utoipa::path(
    post,
    path = "/api/generate-audio",
    tag = "narration",
    request_body = GenerateAudioRequest,
    responses(
        (status = 202, description = "Synthesis started", body = GenerateAudioResponse),
        (status = 400, description = "Text missing or empty", body = crate::error::ApiError),
        (status = 500, description = "Configuration missing or job start failed", body = crate::error::ApiError),
        (status = 503, description = "Server is shutting down", body = crate::error::ApiError)
    )
)]
pub async fn generate_audio(
    State(state): State<AppState>,
    body: std::result::Result<Json<GenerateAudioRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected malformed narration request");
            return Error::Validation(rejection.body_text()).into_response();
        }
    };

    let text = request.text.unwrap_or_default();
    match state.service.submit(&text).await {
        Ok(submission) => (
            StatusCode::ACCEPTED,
            Json(GenerateAudioResponse {
                id: submission.id,
                events_url: submission.events_url,
                status: "Processing started".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            if !matches!(e, Error::Validation(_)) {
                tracing::error!(error = %e, "Failed to start narration");
            }
            e.into_response()
        }
    }
}
