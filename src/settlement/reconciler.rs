//! Webhook reconciliation: consumes gateway-pushed asynchronous events,
//! verifies authenticity, and applies state transitions exactly once.

use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::gateway::{EventMetadata, GatewayEventKind};
use crate::models::{ActorType, EventOutcome};

use super::transition::{apply_transition, PaymentMatch, SettlementTarget, Transition};
use super::audit;

/// Acknowledgement returned on the 200 path.
#[derive(Debug, Serialize)]
pub struct EventAck {
    pub event_type: String,
    /// Whether this delivery actually moved the ledger. Repeated deliveries
    /// and already-settled sessions ack with `false`.
    pub applied: bool,
}

/// Handle one inbound gateway event.
///
/// Safe to call concurrently and safe to call repeatedly with an identical
/// event: the shared transition's terminal-state guard makes reprocessing a
/// no-op. A durable event record is appended before dispatch so even
/// unrecognized event types are retained for audit and replay; if that
/// append fails the event is NOT acknowledged, forcing gateway redelivery.
pub async fn handle_event(state: &AppState, payload: &[u8], signature: &str) -> Result<EventAck> {
    // Step 1 - authenticity. The sole trust boundary for inbound events.
    let event = match state.gateway.verify_event(payload, signature) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("gateway event rejected: {}", e);
            audit(
                state,
                ActorType::System,
                None,
                "handle_event",
                "gateway_event",
                "unknown",
                EventOutcome::Rejected,
                Some(&serde_json::json!({ "reason": e.code() })),
            );
            return Err(e);
        }
    };

    let resource_id = match &event.kind {
        GatewayEventKind::CheckoutCompleted { session_id, .. } => session_id.clone(),
        GatewayEventKind::PaymentSucceeded { intent_id } => intent_id.clone(),
        GatewayEventKind::PaymentFailed {
            intent_id,
            session_id,
        } => intent_id
            .clone()
            .or_else(|| session_id.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        GatewayEventKind::Other { event_type } => event_type.clone(),
    };

    // Step 2 - durability first: retain the raw event before branching on
    // type. Unlike the other entry points this append is NOT best-effort:
    // failing it returns non-2xx so the gateway redelivers.
    {
        let audit_conn = state.audit.get()?;
        queries::append_event_record(
            &audit_conn,
            state.audit_log_enabled,
            ActorType::System,
            None,
            "handle_event",
            "gateway_event",
            &resource_id,
            EventOutcome::Accepted,
            Some(&event.raw),
        )?;
    }

    // Step 3 - dispatch by event type.
    let applied = match event.kind {
        GatewayEventKind::CheckoutCompleted {
            session_id,
            intent_id,
            paid,
            metadata,
        } => {
            if paid {
                settle_session(state, &session_id, intent_id.as_deref(), &metadata)?
            } else {
                // Completion without settlement (delayed payment methods):
                // leave reconciliation to a later intent-level event.
                tracing::info!("checkout completed but unpaid: session={}", session_id);
                false
            }
        }
        GatewayEventKind::PaymentSucceeded { intent_id } => {
            settle_by_match(state, PaymentMatch::ByIntent(&intent_id), SettlementTarget::Succeeded)?
        }
        GatewayEventKind::PaymentFailed {
            intent_id,
            session_id,
        } => {
            let matcher = match (intent_id.as_deref(), session_id.as_deref()) {
                (Some(intent), _) => Some(PaymentMatch::ByIntent(intent)),
                (None, Some(session)) => Some(PaymentMatch::BySession(session)),
                (None, None) => None,
            };
            match matcher {
                Some(m) => settle_by_match(state, m, SettlementTarget::Failed)?,
                None => {
                    tracing::warn!("failure event carries no payment reference");
                    false
                }
            }
        }
        GatewayEventKind::Other { event_type } => {
            tracing::debug!("gateway event retained without action: {}", event_type);
            false
        }
    };

    Ok(EventAck {
        event_type: event.event_type,
        applied,
    })
}

/// Settle a completed checkout session, cross-checking the metadata booking
/// id against the ledger row.
///
/// The booking identity used for the transition comes from the payment row
/// written at session creation; the event metadata (set authoritatively at
/// that same creation) must agree with it. A mismatch is recorded and acked
/// without touching the ledger.
fn settle_session(
    state: &AppState,
    session_id: &str,
    intent_id: Option<&str>,
    metadata: &EventMetadata,
) -> Result<bool> {
    let conn = state.db.get()?;

    if let Some(payment) = queries::get_payment_by_session(&conn, session_id)? {
        if let Some(ref event_booking) = metadata.booking_id {
            if *event_booking != payment.booking_id {
                tracing::warn!(
                    "metadata booking mismatch for session {}: event says {}, ledger says {}",
                    session_id,
                    event_booking,
                    payment.booking_id
                );
                return Ok(false);
            }
        }

        // Record the transaction id for later intent-level events/refunds.
        if let Some(intent) = intent_id {
            queries::set_payment_intent(&conn, &payment.id, intent)?;
        }
    }
    drop(conn);

    settle_by_match(state, PaymentMatch::BySession(session_id), SettlementTarget::Succeeded)
}

/// Apply the shared transition and translate the outcome for webhook
/// acknowledgement. Unmatched events are logged and acked, never fatal -
/// the gateway must not retry indefinitely over data we cannot resolve.
fn settle_by_match(
    state: &AppState,
    matcher: PaymentMatch<'_>,
    target: SettlementTarget,
) -> Result<bool> {
    let mut conn = state.db.get()?;

    match apply_transition(&mut conn, matcher, target)? {
        Transition::Applied(payment) => {
            tracing::info!(
                "settlement applied: payment={}, booking={}, target={:?}",
                payment.id,
                payment.booking_id,
                target
            );
            Ok(true)
        }
        Transition::AlreadySettled(payment) => {
            tracing::info!(
                "settlement already reached: payment={}, status={:?}",
                payment.id,
                payment.status
            );
            Ok(false)
        }
        Transition::Unmatched => {
            tracing::warn!("no payment matched {:?}, event retained for audit", matcher);
            Ok(false)
        }
    }
}
