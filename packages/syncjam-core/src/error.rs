//! Centralized error types for the SyncJam core library.
//!
//! A single `thiserror`-derived enum, each variant carrying a stable
//! machine-readable code and an HTTP status mapping via `IntoResponse`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the SyncJam server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum SyncJamError {
    /// Client sent a structurally invalid or out-of-range command.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Requested track/index does not exist in the queue.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The audio URL resolver failed or timed out.
    #[error("Resolver error: {0}")]
    Resolver(String),

    /// Internal server error (should not normally be reachable by clients).
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SyncJamError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Resolver(_) => "resolver_error",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Resolver(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for SyncJamError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

/// Convenient Result alias for application-wide operations.
pub type SyncJamResult<T> = Result<T, SyncJamError>;
