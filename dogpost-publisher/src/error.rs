//! Error types for dogpost-publisher
//!
//! [`PipelineError`] is the submission-level taxonomy: every stage of the
//! pipeline fails with one of these, and the orchestrator turns it into a
//! status marker. [`ApiError`] is the HTTP-facing error of the trigger API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Submission pipeline error
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Submitter identity does not match the configured allow-listed identity
    #[error("Unauthorized submitter: {}", identity.as_deref().unwrap_or("<none>"))]
    Unauthorized { identity: Option<String> },

    /// Publish signal absent while the publish gate is configured to reject
    #[error("Publish not requested: {0}")]
    PublishNotRequested(String),

    /// Photo answer missing or not a recognised file URL/ID
    #[error("Invalid image reference: {0}")]
    InvalidImageReference(String),

    /// Image bytes could not be obtained from the image source
    #[error("Image fetch failed: {0}")]
    ImageFetch(String),

    /// Every candidate model failed; carries the last upstream error body
    #[error("All models failed. Last error: {last_error}")]
    AllModelsFailed { last_error: String },

    /// Generation response was not the expected JSON article
    #[error("Malformed generation: {0}")]
    MalformedGeneration(String),

    /// Create/update call on the document store returned a non-success status
    #[error("Store write failed ({path}): {status_body}")]
    StoreWriteFailed { path: String, status_body: String },

    /// External call exceeded its configured timeout
    #[error("Timed out: {operation}")]
    Timeout { operation: String },

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// dogpost-common error
    #[error("Common error: {0}")]
    Common(#[from] dogpost_common::Error),
}

impl PipelineError {
    /// Stable short name of the error kind, used as a structured log field
    /// and as the API error code
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Unauthorized { .. } => "UNAUTHORIZED",
            PipelineError::PublishNotRequested(_) => "PUBLISH_NOT_REQUESTED",
            PipelineError::InvalidImageReference(_) => "INVALID_IMAGE_REFERENCE",
            PipelineError::ImageFetch(_) => "IMAGE_FETCH",
            PipelineError::AllModelsFailed { .. } => "ALL_MODELS_FAILED",
            PipelineError::MalformedGeneration(_) => "MALFORMED_GENERATION",
            PipelineError::StoreWriteFailed { .. } => "STORE_WRITE_FAILED",
            PipelineError::Timeout { .. } => "TIMEOUT",
            PipelineError::Config(_) => "CONFIG",
            PipelineError::Io(_) => "IO",
            PipelineError::Common(_) => "COMMON",
        }
    }

    /// Map a transport error to `Timeout` when it is one, otherwise to the
    /// error produced by `fallback`
    pub(crate) fn from_transport<F>(operation: &str, err: reqwest::Error, fallback: F) -> Self
    where
        F: FnOnce(reqwest::Error) -> PipelineError,
    {
        if err.is_timeout() {
            PipelineError::Timeout {
                operation: operation.to_string(),
            }
        } else {
            fallback(err)
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Submitter rejected by the authorization gate (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
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
