//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the narration-relay REST
//! API using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the narration-relay REST API
///
/// The spec can be accessed via:
/// - `/api/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "narration-relay REST API",
        version = "0.1.0",
        description = "Long-form text-to-speech relay: start synthesis jobs, follow their progress over server-sent events and download the finished audio once",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:3001", description = "Local development server")
    ),
    paths(
        // Narration
        crate::api::routes::generate_audio,
        crate::api::routes::operation_events,
        crate::api::routes::download_audio,
        crate::api::routes::get_operation,

        // System
        crate::api::routes::status,
        crate::api::routes::openapi_spec,
    ),
    components(
        schemas(
            // Core types
            crate::types::OperationId,
            crate::types::JobHandle,
            crate::types::ArtifactLocator,
            crate::types::OperationState,
            crate::types::OperationRecord,
            crate::types::ProgressEvent,

            // API request/response types
            crate::api::routes::GenerateAudioRequest,
            crate::api::routes::GenerateAudioResponse,
            crate::api::routes::StatusResponse,

            // Error types
            crate::error::ApiError,
            crate::error::ErrorDetail,
        )
    ),
    tags(
        (name = "narration", description = "Synthesis requests, progress streams and downloads"),
        (name = "system", description = "Liveness and API documentation")
    )
)]
pub struct ApiDoc;
