//! Error types for narration-relay
//!
//! This module provides error handling for the relay, including:
//! - Domain-specific error types (operation lifecycle, synthesis supplier, blob store)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use crate::types::{OperationId, OperationState};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for narration-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for narration-relay
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration is missing or invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "GCS_BUCKET_NAME")
        key: Option<String>,
    },

    /// Request input failed validation
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation lifecycle error (unknown, not ready, artifact gone)
    #[error("operation error: {0}")]
    Operation(#[from] OperationError),

    /// Synthesis job supplier error
    #[error("synthesis error: {0}")]
    Supplier(#[from] SupplierError),

    /// Blob store error
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new synthesis requests
    #[error("shutdown in progress: not accepting new synthesis requests")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error for a missing required key
    pub fn missing_config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Errors raised while resolving or transitioning an operation
#[derive(Debug, Error)]
pub enum OperationError {
    /// Operation is unknown (expired, retired or never existed)
    #[error("operation {id} not found")]
    NotFound {
        /// The operation ID that was not found
        id: OperationId,
    },

    /// Operation exists but its artifact is not ready for download
    #[error("operation {id} is not ready (state: {state})")]
    NotReady {
        /// The operation ID
        id: OperationId,
        /// The state the operation is currently in
        state: OperationState,
    },

    /// The artifact no longer exists in the blob store; the operation was retired
    #[error("artifact for operation {id} is no longer available at {locator}")]
    ArtifactGone {
        /// The operation ID
        id: OperationId,
        /// Where the artifact was expected
        locator: String,
    },

    /// A mutation attempted to move the state machine backwards
    #[error("operation {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The operation ID
        id: OperationId,
        /// State before the rejected mutation
        from: OperationState,
        /// State the mutation tried to set
        to: OperationState,
    },
}

/// Errors reported by the synthesis job supplier
#[derive(Debug, Clone, Error)]
pub enum SupplierError {
    /// Transport-level failure (timeout, connection, 5xx, throttling)
    #[error("synthesis service unavailable: {0}")]
    Unavailable(String),

    /// The supplier rejected the request permanently
    #[error("synthesis request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the supplier
        status: u16,
        /// Message returned by the supplier
        message: String,
    },

    /// The supplier response could not be understood
    #[error("invalid synthesis response: {0}")]
    InvalidResponse(String),

    /// The supplier is missing required configuration
    #[error("synthesis supplier misconfigured: {0}")]
    Misconfigured(String),
}

/// Errors reported by the blob store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Transport-level failure (timeout, connection, 5xx, throttling)
    #[error("blob store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the request permanently
    #[error("blob store request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the store
        status: u16,
        /// Message returned by the store
        message: String,
    },

    /// Reading the artifact body failed mid-stream
    #[error("failed to read artifact: {0}")]
    Read(String),

    /// The artifact locator is malformed
    #[error("invalid artifact locator: {0}")]
    InvalidLocator(String),
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "operation_not_found",
///     "message": "operation error: operation 3f2c... not found",
///     "details": {
///       "operation_id": "3f2c..."
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "operation_not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - invalid input
            Error::Validation(_) => 400,

            // 404 Not Found - unknown, not-ready or expired operations
            Error::Operation(OperationError::NotFound { .. }) => 404,
            Error::Operation(OperationError::NotReady { .. }) => 404,
            Error::Operation(OperationError::ArtifactGone { .. }) => 404,

            // 409 Conflict
            Error::Operation(OperationError::InvalidTransition { .. }) => 409,

            // 500 Internal Server Error - operator-visible failures
            Error::Config { .. } => 500,
            Error::Supplier(_) => 500,
            Error::Store(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::Operation(e) => match e {
                OperationError::NotFound { .. } => "operation_not_found",
                OperationError::NotReady { .. } => "operation_not_ready",
                OperationError::ArtifactGone { .. } => "artifact_gone",
                OperationError::InvalidTransition { .. } => "invalid_transition",
            },
            Error::Supplier(_) => "supplier_error",
            Error::Store(_) => "store_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::Operation(OperationError::NotFound { id }) => Some(serde_json::json!({
                "operation_id": id,
            })),
            Error::Operation(OperationError::NotReady { id, state }) => Some(serde_json::json!({
                "operation_id": id,
                "state": state,
            })),
            Error::Operation(OperationError::ArtifactGone { id, locator }) => {
                Some(serde_json::json!({
                    "operation_id": id,
                    "locator": locator,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
