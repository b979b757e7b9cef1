//! Error types for parcel-matcher

use crate::services::parcel_client::LookupFailure;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failure of the per-photo pipeline that is not a legitimate negative result
///
/// Negative results (no coordinates, no parcel, outside boundary, low
/// confidence) are `MatchOutcome::Unassigned`, never errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Provider outage or malformed response, after retries
    #[error("parcel lookup failed: {0}")]
    Lookup(#[from] LookupFailure),

    /// Database read or write failed
    #[error("persistence failure: {0}")]
    Persistence(#[from] parcel_common::Error),

    #[error("photo not found: {0}")]
    PhotoNotFound(Uuid),

    #[error("property not found: {0}")]
    PropertyNotFound(Uuid),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Conditions recorded on the photo as an `Error` outcome instead of surfacing
    pub fn is_recordable(&self) -> bool {
        matches!(self, PipelineError::Lookup(_) | PipelineError::Timeout(_))
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. a batch run already in progress
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Dependency not configured or unavailable (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// parcel-common error
    #[error("Common error: {0}")]
    Common(#[from] parcel_common::Error),

    /// Pipeline error
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
            ApiError::Pipeline(ref err) => match err {
                PipelineError::PhotoNotFound(_) | PipelineError::PropertyNotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
                }
                PipelineError::Lookup(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", err.to_string()),
                PipelineError::Timeout(_) => {
                    (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", err.to_string())
                }
                PipelineError::Cancelled => (StatusCode::CONFLICT, "CANCELLED", err.to_string()),
                PipelineError::Persistence(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PERSISTENCE_ERROR",
                    err.to_string(),
                ),
            },
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
