use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The booking is already settled; a second charge attempt is never valid.
    #[error("Booking already settled")]
    AlreadySettled,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Rate limited")]
    RateLimited,

    /// Transient gateway failure - retryable by the caller or by the
    /// gateway's own webhook redelivery.
    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code surfaced to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::BookingNotFound(_) => "booking_not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::AlreadySettled => "already_settled",
            AppError::InvalidAmount(_) => "invalid_amount",
            AppError::InvalidSignature => "invalid_signature",
            AppError::RateLimited => "rate_limited",
            AppError::Gateway(_) => "gateway_error",
            AppError::Database(_) => "internal_error",
            AppError::Pool(_) => "internal_error",
            AppError::Json(_) => "invalid_json",
            AppError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BookingNotFound(id) => {
                (StatusCode::NOT_FOUND, "Booking not found", Some(id.clone()))
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone()))
            }
            AppError::AlreadySettled => {
                (StatusCode::BAD_REQUEST, "Booking already settled", None)
            }
            AppError::InvalidAmount(msg) => {
                (StatusCode::BAD_REQUEST, "Invalid amount", Some(msg.clone()))
            }
            AppError::InvalidSignature => {
                (StatusCode::BAD_REQUEST, "Invalid signature", None)
            }
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Rate limited", None),
            AppError::Gateway(msg) => {
                tracing::error!("Gateway error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Gateway error", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            code,
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
