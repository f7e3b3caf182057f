mod payments;
mod webhooks;

pub use payments::*;
pub use webhooks::*;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::rate_limit::RateLimiter;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Caller identity as validated by the (out-of-scope) auth layer upstream.
/// Used for rate-limit keying and audit attribution only.
pub(crate) fn caller_id(headers: &HeaderMap) -> String {
    headers
        .get("x-caller-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string()
}

/// Per-(caller, action) request guard. Exceeding the window rejects with
/// `RateLimited`; internal limiter failures allow the call (fail-open).
pub(crate) fn check_rate_limit(state: &AppState, caller: &str, action: &str) -> Result<()> {
    if state.rate_limiter.check(&RateLimiter::key(caller, action)) {
        Ok(())
    } else {
        Err(AppError::RateLimited)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/payments/session", post(create_session))
        .route("/payments/verify/{session_id}", get(verify_session))
        .route("/payments/process", post(process_payment))
        .route("/audit/events", get(list_audit_events))
        .route("/webhooks/gateway", post(handle_gateway_webhook))
}
