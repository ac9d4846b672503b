//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`generate`] - Accepting narration requests
//! - [`events`] - Per-operation progress streams
//! - [`download`] - One-shot artifact download
//! - [`operations`] - Operation inspection
//! - [`system`] - Status and OpenAPI

use crate::error::ApiError;
use crate::types::OperationId;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

mod download;
mod events;
mod generate;
mod operations;
mod system;

pub use download::*;
pub use events::*;
pub use generate::*;
pub use operations::*;
pub use system::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Request body for POST /api/generate-audio
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct GenerateAudioRequest {
    /// Text to narrate
    #[serde(default)]
    pub text: Option<String>,
}

/// Response body for an accepted narration request
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAudioResponse {
    /// Operation ID
    pub id: OperationId,
    /// Relative URL of the operation's progress stream
    pub events_url: String,
    /// Human-readable status
    pub status: String,
}

/// Response body for GET /api/status
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StatusResponse {
    /// Liveness message
    pub status: String,
    /// Server time (RFC 3339)
    pub timestamp: String,
}

/// Parse an operation ID from a path segment.
///
/// IDs are opaque to callers, so a segment that is not a valid ID is
/// reported the same way as an unknown operation.
pub(crate) fn parse_operation_id(raw: &str) -> std::result::Result<OperationId, Response> {
    raw.parse().map_err(|_| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError::new(
                "operation_not_found",
                format!("operation {raw} not found"),
            )),
        )
            .into_response()
    })
}
