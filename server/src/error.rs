//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use notesync_engine::Record;
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The stored note wins over the submitted one.
    #[error("Conflict: stored note '{}' is at {}", .0.key(), .0.updated_at())]
    Conflict(Box<Record>),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    /// The winning note on a conflict
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<Record>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details, current) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                    None,
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None, None),
            AppError::Conflict(current) => {
                tracing::debug!(key = %current.key(), "Rejected stale note");
                (
                    StatusCode::CONFLICT,
                    "A newer note is already stored".to_string(),
                    None,
                    Some(*current),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(msg),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error,
            details,
            current,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
