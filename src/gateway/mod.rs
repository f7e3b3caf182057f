//! Payment gateway contract and implementations.
//!
//! The core treats the gateway as an external service with a documented
//! contract: create a checkout session, retrieve a session by id, verify a
//! signed asynchronous event. Everything downstream depends on this trait,
//! never on a concrete provider.

mod mock;
mod stripe;
mod wire;

pub use mock::MockGateway;
pub use stripe::StripeGateway;
pub use wire::{WireEvent, WireMetadata, WireObject};

use async_trait::async_trait;

use crate::error::Result;

/// Outbound request to open a checkout session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    /// Integer minor units (cents). Computed by the initiator, never here.
    pub amount_minor: i64,
    pub currency: String,
    /// Set as opaque session metadata; the only channel by which later
    /// asynchronous events are linked back to a booking.
    pub booking_id: String,
    pub payer_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// A created checkout session: the handle returned to the caller.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    pub id: String,
    pub url: String,
}

/// Current gateway-side truth about a session, as seen by the poller.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: String,
    pub paid: bool,
    /// Gateway transaction id, present once the gateway settles.
    pub intent_id: Option<String>,
    /// Metadata attached at session creation. Lets the poller resolve a
    /// session that was created at the gateway but never recorded locally.
    pub metadata: EventMetadata,
}

/// Metadata echoed back on asynchronous events. Values originate from
/// session creation, not from attacker-controllable request fields.
#[derive(Debug, Clone, Default)]
pub struct EventMetadata {
    pub booking_id: Option<String>,
    pub payer_id: Option<String>,
}

/// Provider-agnostic settlement event, produced by signature verification.
#[derive(Debug, Clone)]
pub enum GatewayEventKind {
    /// Checkout session completed. `paid` is false for e.g. delayed payment
    /// methods where completion precedes settlement.
    CheckoutCompleted {
        session_id: String,
        intent_id: Option<String>,
        paid: bool,
        metadata: EventMetadata,
    },
    /// Lower-level confirmation of the same settlement.
    PaymentSucceeded { intent_id: String },
    PaymentFailed {
        intent_id: Option<String>,
        session_id: Option<String>,
    },
    /// Recognized envelope, irrelevant type. Retained for audit only.
    Other { event_type: String },
}

/// A verified inbound event: typed kind plus the raw payload for the audit
/// trail.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub kind: GatewayEventKind,
    pub event_type: String,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Provider name for logging and audit records.
    fn name(&self) -> &'static str;

    async fn create_session(&self, req: &CreateSessionRequest) -> Result<GatewaySession>;

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionSnapshot>;

    /// Verify an inbound event's authenticity and parse it. This is the sole
    /// trust boundary for asynchronous notifications; returns
    /// `AppError::InvalidSignature` when authenticity cannot be established.
    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<GatewayEvent>;
}
