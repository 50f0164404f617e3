use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::BookingKey;

/// Failures of the booking store. All of them are treated as transient by callers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("corrupt booking {key}: {reason}")]
    Corrupt { key: BookingKey, reason: String },
}

/// Failures delivering a reminder to the customer.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("booking {0} has no channel route")]
    MissingRoute(BookingKey),

    #[error("messaging transport failed: {0:#}")]
    Transport(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
