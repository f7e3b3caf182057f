//! Wire format shared by gateway event payloads.
//!
//! Both the Stripe client and the mock gateway speak the same envelope
//! (`{"type": ..., "data": {"object": ...}}`), so parsing into the
//! provider-agnostic [`GatewayEventKind`](super::GatewayEventKind) lives here.

use serde::Deserialize;

use crate::error::{AppError, Result};

use super::{EventMetadata, GatewayEvent, GatewayEventKind};

#[derive(Debug, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WireEventData,
}

#[derive(Debug, Deserialize)]
pub struct WireEventData {
    pub object: serde_json::Value,
}

/// Event object fields the reconciler cares about. Checkout sessions carry
/// `payment_status` and metadata; payment intents carry only their id.
#[derive(Debug, Deserialize)]
pub struct WireObject {
    pub id: String,
    pub payment_status: Option<String>,
    pub payment_intent: Option<String>,
    /// Session id back-reference on intent-level events, when present.
    pub session: Option<String>,
    #[serde(default)]
    pub metadata: WireMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireMetadata {
    pub booking_id: Option<String>,
    pub payer_id: Option<String>,
}

impl From<WireMetadata> for EventMetadata {
    fn from(m: WireMetadata) -> Self {
        EventMetadata {
            booking_id: m.booking_id,
            payer_id: m.payer_id,
        }
    }
}

/// Parse a verified payload into a typed event. Unknown event types are not
/// an error; they surface as `Other` so the reconciler can retain them.
pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent> {
    let raw: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| AppError::BadRequest(format!("Invalid event payload: {}", e)))?;
    let event: WireEvent = serde_json::from_value(raw.clone())
        .map_err(|e| AppError::BadRequest(format!("Invalid event envelope: {}", e)))?;

    let kind = match event.event_type.as_str() {
        "checkout.session.completed" => {
            let object: WireObject = serde_json::from_value(event.data.object)
                .map_err(|e| AppError::BadRequest(format!("Invalid checkout session: {}", e)))?;
            GatewayEventKind::CheckoutCompleted {
                session_id: object.id,
                intent_id: object.payment_intent,
                paid: object.payment_status.as_deref() == Some("paid"),
                metadata: object.metadata.into(),
            }
        }
        "payment_intent.succeeded" => {
            let object: WireObject = serde_json::from_value(event.data.object)
                .map_err(|e| AppError::BadRequest(format!("Invalid payment intent: {}", e)))?;
            GatewayEventKind::PaymentSucceeded {
                intent_id: object.id,
            }
        }
        "payment_intent.payment_failed" => {
            let object: WireObject = serde_json::from_value(event.data.object)
                .map_err(|e| AppError::BadRequest(format!("Invalid payment intent: {}", e)))?;
            GatewayEventKind::PaymentFailed {
                intent_id: Some(object.id),
                session_id: object.session,
            }
        }
        other => GatewayEventKind::Other {
            event_type: other.to_string(),
        },
    };

    Ok(GatewayEvent {
        kind,
        event_type: event.event_type,
        raw,
    })
}
