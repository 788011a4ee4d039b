//! Error types for the server.

use std::any::Any;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use cadence_llm::{LlmError, ModelFailure};
use cadence_upstream::UpstreamError;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Bad request.
    #[error("{0}")]
    BadRequest(String),

    /// Operation exists but not for this HTTP method.
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// A secret or setting the operation needs is missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An upstream API could not be reached or refused us.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Every model in the fallback list failed.
    #[error("All models failed")]
    AllModelsFailed(Vec<ModelFailure>),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ServerError::MethodNotAllowed(_) => {
                (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed")
            }
            ServerError::Config(_) => (StatusCode::SERVICE_UNAVAILABLE, "config_error"),
            ServerError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            ServerError::AllModelsFailed(_) => (StatusCode::BAD_GATEWAY, "all_models_failed"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl From<UpstreamError> for ServerError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::InvalidRequest(msg) => ServerError::BadRequest(msg),
            UpstreamError::Config(msg) => ServerError::Config(msg),
            other => ServerError::Upstream(other.to_string()),
        }
    }
}

impl From<LlmError> for ServerError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::AllModelsFailed(failures) => ServerError::AllModelsFailed(failures),
            LlmError::Config(msg) => ServerError::Config(msg),
            LlmError::Internal(msg) => ServerError::Internal(msg),
            other => ServerError::Upstream(other.to_string()),
        }
    }
}

impl From<cadence_config::ConfigError> for ServerError {
    fn from(e: cadence_config::ConfigError) -> Self {
        ServerError::Config(e.to_string())
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Per-model failures, only for `all_models_failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<Vec<ModelFailure>>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %message, "Server error");
        } else {
            tracing::warn!(status = %status, code, error = %message, "Client error");
        }

        let failures = match self {
            ServerError::AllModelsFailed(failures) => Some(failures),
            _ => None,
        };
        let body = ErrorResponse {
            code: code.to_string(),
            message,
            failures,
        };

        (status, Json(body)).into_response()
    }
}

/// Turn a handler panic into the standard 500 body.
///
/// Used with `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "Handler panicked");
    ServerError::Internal("Unexpected failure".to_string()).into_response()
}
