use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::extraction::ExtractionError;
use crate::latex::CompileError;
use crate::storage::PublishError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Unauthorized")]
    Unauthorized,

    /// Compiler rejected the source. `log` is the raw compiler output so the
    /// user can fix the LaTeX by hand.
    #[error("LaTeX compilation failed")]
    Compilation {
        log: String,
        line: Option<u32>,
        latex: Option<String>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Maps a compiler error, attaching the source that failed when known.
    pub fn from_compile(error: CompileError, latex: Option<String>) -> Self {
        match error {
            CompileError::Failed { log, line } => AppError::Compilation { log, line, latex },
            CompileError::TimedOut(_) => AppError::Compilation {
                log: error.to_string(),
                line: None,
                latex,
            },
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<ExtractionError> for AppError {
    fn from(error: ExtractionError) -> Self {
        match error {
            ExtractionError::TooLarge => AppError::PayloadTooLarge(error.to_string()),
            ExtractionError::NotPdf => AppError::UnsupportedMediaType(error.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<PublishError> for AppError {
    fn from(error: PublishError) -> Self {
        match error {
            PublishError::Read(e) => AppError::Internal(anyhow::Error::new(e)),
            exhausted => AppError::Storage(exhausted.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Compilation { log, line, latex } => {
                tracing::warn!("Compilation failed (line {line:?})");
                let body = Json(json!({
                    "error": {
                        "code": "COMPILATION_FAILED",
                        "message": "LaTeX compilation failed. See the log for details.",
                        "log": log,
                        "line": line,
                        "latex": latex,
                    }
                }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg)
            }
            AppError::UnsupportedMediaType(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                msg,
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "STORAGE_ERROR",
                    "The compiled PDF could not be stored".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
