use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

use super::wire;
use super::{CreateSessionRequest, GatewayClient, GatewayEvent, GatewaySession, SessionSnapshot};

type HmacSha256 = Hmac<Sha256>;

/// Request timeout for Stripe API calls. No settlement operation is allowed
/// to block indefinitely; a timed-out call surfaces as a retryable error.
const STRIPE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    payment_intent: Option<String>,
    #[serde(default)]
    metadata: super::WireMetadata,
}

#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeGateway {
    pub fn new(secret_key: &str, webhook_secret: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(STRIPE_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
        })
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        // Stripe signature format: t=timestamp,v1=signature
        let parts: Vec<&str> = signature.split(',').collect();

        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in parts {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let (Some(timestamp_str), Some(sig_v1)) = (timestamp, sig_v1) else {
            return Ok(false);
        };

        // Parse and validate timestamp to prevent replay attacks.
        // Reject webhooks older than WEBHOOK_TIMESTAMP_TOLERANCE_SECS.
        let Ok(timestamp) = timestamp_str.parse::<i64>() else {
            return Ok(false);
        };

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        // Also reject timestamps from the future (clock skew tolerance: 60 seconds)
        if age < -60 {
            tracing::warn!(
                "Stripe webhook rejected: timestamp in the future (age={}s)",
                age
            );
            return Ok(false);
        }

        let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Use constant-time comparison to prevent timing attacks.
        // An attacker could otherwise measure response times to progressively
        // discover the correct signature byte-by-byte.
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        // Length check is not constant-time, but that's fine - signature length
        // is not secret (it's always 64 hex chars for SHA-256)
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}

#[async_trait]
impl GatewayClient for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    /// Create a Stripe checkout session with an ad-hoc price built from the
    /// booking amount. The booking id rides along as session metadata so
    /// later asynchronous events can be linked back to the ledger.
    async fn create_session(&self, req: &CreateSessionRequest) -> Result<GatewaySession> {
        let amount = req.amount_minor.to_string();
        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("success_url", &req.success_url),
            ("cancel_url", &req.cancel_url),
            ("line_items[0][price_data][currency]", &req.currency),
            ("line_items[0][price_data][unit_amount]", &amount),
            ("line_items[0][price_data][product_data][name]", "Charter flight booking"),
            ("line_items[0][quantity]", "1"),
            ("metadata[booking_id]", &req.booking_id),
        ];
        if let Some(ref payer_id) = req.payer_id {
            form.push(("metadata[payer_id]", payer_id));
        }

        let response = self
            .client
            .post("https://api.stripe.com/v1/checkout/sessions")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("Stripe API error: {}", error_text)));
        }

        let session: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe response: {}", e)))?;

        let url = session
            .url
            .ok_or_else(|| AppError::Gateway("Stripe session missing redirect URL".into()))?;

        Ok(GatewaySession {
            id: session.id,
            url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionSnapshot> {
        let response = self
            .client
            .get(format!(
                "https://api.stripe.com/v1/checkout/sessions/{}",
                session_id
            ))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("Session not found: {}", session_id)));
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("Stripe API error: {}", error_text)));
        }

        let session: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(SessionSnapshot {
            id: session.id,
            paid: session.payment_status.as_deref() == Some("paid"),
            intent_id: session.payment_intent,
            metadata: session.metadata.into(),
        })
    }

    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<GatewayEvent> {
        if !self.verify_webhook_signature(payload, signature)? {
            return Err(AppError::InvalidSignature);
        }
        wire::parse_event(payload)
    }
}
