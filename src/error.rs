// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::services::{lesson::LessonError, passback::PassbackError};
use crate::store::StoreError;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden (e.g., non-instructor linking an assignment)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., assignment already linked to another lesson)
    Conflict(String),

    // 503 Service Unavailable, the client is expected to retry
    Unavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Store failures on read paths surface as a retryable 503.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Unavailable(format!("Progress store unavailable, please retry ({})", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<PassbackError> for AppError {
    fn from(err: PassbackError) -> Self {
        match err {
            PassbackError::AlreadyLinked(_) => AppError::Conflict(err.to_string()),
            PassbackError::Expired => AppError::AuthError(
                "Your session has expired or been invalidated, please reload".to_string(),
            ),
            PassbackError::NotAuthorized => AppError::Forbidden(err.to_string()),
            PassbackError::NotConfigured => AppError::Unavailable(err.to_string()),
            PassbackError::Rejected(_) | PassbackError::Transport(_) => {
                tracing::error!("Error setting lesson: {}", err);
                AppError::Unavailable("Error linking assignment, please retry".to_string())
            }
        }
    }
}

impl From<LessonError> for AppError {
    fn from(err: LessonError) -> Self {
        match err {
            LessonError::NotLearning(_) => AppError::Conflict(err.to_string()),
            LessonError::UnknownStep(_) | LessonError::ProblemUnsolved => {
                AppError::BadRequest(err.to_string())
            }
        }
    }
}
