//! API Error Handling
//!
//! Unified error type and conversion for API responses. Every error body is
//! `{"error": kind, "message": text}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::OrchestratorError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    InvalidTransition(String),
    Conflict(String),
    DispatchFailed(String),
    Unauthorized(String),
    Forbidden(String),
    InternalError(String),
}

impl ApiError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::InvalidTransition(msg) => (StatusCode::CONFLICT, "invalid_transition", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::DispatchFailed(msg) => (StatusCode::BAD_GATEWAY, "dispatch_failed", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();
        (
            status,
            Json(serde_json::json!({ "error": kind, "message": message })),
        )
            .into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Reference(msg) => ApiError::NotFound(msg),
            OrchestratorError::Validation(msg) => ApiError::BadRequest(msg),
            e @ OrchestratorError::InvalidTransition { .. } => {
                ApiError::InvalidTransition(e.to_string())
            }
            OrchestratorError::Conflict(msg) => ApiError::Conflict(msg),
            OrchestratorError::Dispatch(e) => ApiError::DispatchFailed(e.to_string()),
            OrchestratorError::Storage(e) => {
                tracing::error!("Storage error: {:?}", e);
                ApiError::InternalError("Internal server error".to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DispatchError, StorageError};
    use conductor_core::domain::job::{IllegalTransition, JobStatus};

    fn status_of(err: OrchestratorError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            status_of(OrchestratorError::job_not_found(1)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(OrchestratorError::Validation("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(OrchestratorError::InvalidTransition {
                job_id: 1,
                source: IllegalTransition {
                    from: JobStatus::Success,
                    to: JobStatus::Running,
                },
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrchestratorError::Conflict("busy".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrchestratorError::Dispatch(DispatchError::Unreachable(
                "down".to_string()
            ))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(OrchestratorError::Storage(StorageError::InvalidRow(
                "secret detail".to_string()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_storage_details_are_not_exposed() {
        let (_, kind, message) = ApiError::from(OrchestratorError::Storage(
            StorageError::InvalidRow("secret detail".to_string()),
        ))
        .parts();

        assert_eq!(kind, "internal_error");
        assert!(!message.contains("secret"));
    }
}
