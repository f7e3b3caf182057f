//! In-process gateway for development and tests.
//!
//! This is the internal "initiate-payment/process-payment" pipeline folded
//! behind the same [`GatewayClient`] contract as the real provider: same
//! session semantics, same signed-event wire format, no separate business
//! logic. Sessions live in memory and settle only when a test or dev tool
//! marks them paid.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::wire;
use super::{
    CreateSessionRequest, EventMetadata, GatewayClient, GatewayEvent, GatewaySession,
    SessionSnapshot,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
struct MockSession {
    paid: bool,
    intent_id: Option<String>,
    booking_id: String,
    payer_id: Option<String>,
}

pub struct MockGateway {
    sessions: Mutex<HashMap<String, MockSession>>,
    secret: String,
    base_url: String,
}

impl MockGateway {
    pub fn new(secret: &str, base_url: &str) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            secret: secret.to_string(),
            base_url: base_url.to_string(),
        }
    }

    /// Settle a session on the gateway side, assigning a transaction id.
    /// Returns the intent id, or `None` if the session is unknown.
    pub fn mark_paid(&self, session_id: &str) -> Option<String> {
        let mut sessions = self.sessions.lock().ok()?;
        let session = sessions.get_mut(session_id)?;
        let intent_id = session
            .intent_id
            .get_or_insert_with(|| format!("mi_{}", Uuid::new_v4().as_simple()))
            .clone();
        session.paid = true;
        Some(intent_id)
    }

    /// Sign a payload the way this gateway's events are signed: hex-encoded
    /// HMAC-SHA256 over the raw body.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl GatewayClient for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_session(&self, req: &CreateSessionRequest) -> Result<GatewaySession> {
        if req.amount_minor <= 0 {
            return Err(AppError::Gateway("Amount must be positive".into()));
        }

        let id = format!("ms_{}", Uuid::new_v4().as_simple());
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| AppError::Internal("Mock gateway lock poisoned".into()))?;
        sessions.insert(
            id.clone(),
            MockSession {
                paid: false,
                intent_id: None,
                booking_id: req.booking_id.clone(),
                payer_id: req.payer_id.clone(),
            },
        );

        Ok(GatewaySession {
            url: format!("{}/mock/checkout/{}", self.base_url, id),
            id,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionSnapshot> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| AppError::Internal("Mock gateway lock poisoned".into()))?;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))?;

        Ok(SessionSnapshot {
            id: session_id.to_string(),
            paid: session.paid,
            intent_id: session.intent_id.clone(),
            metadata: EventMetadata {
                booking_id: Some(session.booking_id.clone()),
                payer_id: session.payer_id.clone(),
            },
        })
    }

    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<GatewayEvent> {
        let expected = self.sign(payload);
        let expected_bytes = expected.as_bytes();
        let provided_bytes = signature.as_bytes();

        if expected_bytes.len() != provided_bytes.len() {
            return Err(AppError::InvalidSignature);
        }
        if !bool::from(expected_bytes.ct_eq(provided_bytes)) {
            return Err(AppError::InvalidSignature);
        }

        wire::parse_event(payload)
    }
}
