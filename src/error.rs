//! Error types for Academy Sync

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::records::{KeyError, Table};
use crate::remote::RemoteError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Local store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid key: {0}")]
    Key(#[from] KeyError),

    #[error("{found} key used against the {expected} table")]
    TableMismatch { expected: Table, found: Table },

    #[error("Corrupt row in {table}: {message}")]
    Corrupt { table: String, message: String },
}

impl From<KeyError> for AppError {
    fn from(e: KeyError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            AppError::Store(e) => {
                tracing::error!("Local store error: {}", e);
                match e {
                    StoreError::Key(_) | StoreError::TableMismatch { .. } => {
                        (StatusCode::BAD_REQUEST, "bad_request", e.to_string())
                    }
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "database_error",
                        "Database error".to_string(),
                    ),
                }
            }
            AppError::Remote(e) => {
                tracing::error!("Remote store error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "remote_error",
                    "Remote store error".to_string(),
                )
            }
            AppError::Json(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_record",
                format!("Invalid record: {}", e),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
