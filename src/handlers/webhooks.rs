use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::settlement::{self, EventAck};

use super::check_rate_limit;

/// Pull the signature header, accepting the provider-specific name as well
/// as the generic one used by the mock pipeline.
fn extract_signature(headers: &HeaderMap) -> Result<&str> {
    headers
        .get("stripe-signature")
        .or_else(|| headers.get("x-gateway-signature"))
        .ok_or_else(|| AppError::BadRequest("Missing signature header".into()))?
        .to_str()
        .map_err(|_| AppError::BadRequest("Invalid signature header".into()))
}

/// POST /webhooks/gateway - asynchronous settlement notifications.
///
/// 200 acknowledges a durably recorded event (applied or no-op); any error
/// status tells the gateway to redeliver.
pub async fn handle_gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EventAck>> {
    // Webhook volume is bounded per gateway, not per end user; the caller
    // identity header is not meaningful on this path.
    check_rate_limit(&state, state.gateway.name(), "handle_event")?;

    let signature = extract_signature(&headers)?;
    let ack = settlement::handle_event(&state, &body, signature).await?;
    Ok(Json(ack))
}
