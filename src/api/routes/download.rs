//! One-shot artifact download.

use super::parse_operation_id;
use crate::api::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{
        StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};

/// GET /api/download/:id - Stream the finished audio, then purge it
///
/// The artifact is deleted from the store and the operation retired once the
/// body has been fully sent or the client disconnects.
#[utoipa::path(
    get,
    path = "/api/download/{id}",
    tag = "narration",
    params(
        ("id" = String, Path, description = "Operation ID")
    ),
    responses(
        (status = 200, description = "Audio artifact", content_type = "audio/mpeg"),
        (status = 404, description = "Operation unknown, not ready, or artifact gone", body = crate::error::ApiError),
        (status = 500, description = "Blob store failure", body = crate::error::ApiError)
    )
)]
pub async fn download_audio(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let id = match parse_operation_id(&raw) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.service.download(id).await {
        Ok(download) => {
            let disposition = format!("attachment; filename=\"{}\"", download.filename);
            (
                StatusCode::OK,
                [
                    (CONTENT_TYPE, download.content_type.to_string()),
                    (CONTENT_DISPOSITION, disposition),
                ],
                Body::from_stream(download.body),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(operation_id = %id, error = %e, "Download refused");
            e.into_response()
        }
    }
}
