//! Error types for the Conductor client

use serde::Deserialize;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the Conductor client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}, {kind}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error kind reported by the orchestrator, e.g. `not_found`
        kind: String,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Error body returned by the orchestrator
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Builds an API error from a raw response body, which is usually
    /// `{"error": kind, "message": text}` but may be plain text
    pub fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => Self::api_error(status, parsed.error, parsed.message),
            Err(_) => Self::api_error(status, "unknown", body.trim()),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if the orchestrator rejected a status change
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::ApiError { kind, .. } if kind == "invalid_transition")
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}
