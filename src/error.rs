//! Error types for the Stacks server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error kinds exposed to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    InvalidState,
    Validation,
    Conflict,
    Internal,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub message: String,
}

impl AppError {
    /// The stable kind and HTTP status this error maps to
    pub fn kind(&self) -> (StatusCode, ErrorKind) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorKind::Unauthenticated),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, ErrorKind::Forbidden),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorKind::NotFound),
            AppError::InvalidState(_) => (StatusCode::BAD_REQUEST, ErrorKind::InvalidState),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, ErrorKind::Validation),
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorKind::Conflict),
            AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Internal)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.kind();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: kind,
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
