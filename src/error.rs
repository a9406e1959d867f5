use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, realtime::ChannelError, state::room::RoomError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Action not allowed in the room's current state.
    #[error("{0}")]
    Conflict(String),
    /// Caller lacks the role or eligibility required.
    #[error("{0}")]
    Forbidden(String),
    /// Requested room, pack, category or player does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Running without an archive backend.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl From<RoomError> for ServiceError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::Conflict(message) => ServiceError::Conflict(message),
            RoomError::Forbidden(message) => ServiceError::Forbidden(message),
            RoomError::NotFound(message) => ServiceError::NotFound(message),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { key } => ServiceError::NotFound(format!("{key} not found")),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<ChannelError> for ServiceError {
    fn from(err: ChannelError) -> Self {
        ServiceError::Unavailable(StorageError::unavailable("channel failure".into(), err))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Caller identity missing.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller not allowed to perform the action.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Conflict(message) => AppError::Conflict(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
