//! Verification poller: the synchronous fallback when a webhook is delayed
//! or never arrives. Pulls current gateway truth for a session and applies
//! the same shared transition as the reconciler.

use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::models::{ActorType, CreatePayment, EventOutcome, PaymentStatus};

use super::transition::{apply_transition, PaymentMatch, SettlementTarget, Transition};
use super::audit;

#[derive(Debug, Serialize)]
pub struct VerifyOutcome {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
}

/// Check a session against the gateway and settle it locally if paid.
///
/// If the gateway does not report the session as paid this is a safe,
/// repeatable read-only probe: no state is mutated. If it is paid, the
/// shared transition runs - converging with any concurrently delivered
/// webhook on the same terminal state.
pub async fn verify_session(
    state: &AppState,
    caller: Option<&str>,
    session_id: &str,
) -> Result<VerifyOutcome> {
    let snapshot = state.gateway.retrieve_session(session_id).await?;

    let mut conn = state.db.get()?;

    if !snapshot.paid {
        let payment = queries::get_payment_by_session(&conn, session_id)?;
        return Ok(VerifyOutcome {
            verified: false,
            status: payment.as_ref().map(|p| p.status),
            booking_id: payment.map(|p| p.booking_id),
        });
    }

    // Gateway says paid. Repair a reconciliation gap first: a session that
    // was created at the gateway but never recorded locally is recreated
    // from the session metadata before the transition runs.
    if queries::get_payment_by_session(&conn, session_id)?.is_none() {
        if let Some(ref booking_id) = snapshot.metadata.booking_id {
            if let Some(booking) = queries::get_booking(&conn, booking_id)? {
                tracing::warn!(
                    "recovering unrecorded session {} for booking {}",
                    session_id,
                    booking.id
                );
                // Minor units are not part of the snapshot; the booking's
                // own amount is what priced the session.
                match super::initiator::to_minor_units(&booking) {
                    Ok(amount_minor) => {
                        queries::create_payment(
                            &conn,
                            &CreatePayment {
                                booking_id: booking.id.clone(),
                                session_id: session_id.to_string(),
                                amount_minor,
                                currency: booking.currency.to_lowercase(),
                            },
                        )?;
                    }
                    Err(e) => {
                        tracing::error!(
                            "cannot recover session {}: booking {} amount unusable: {}",
                            session_id,
                            booking.id,
                            e
                        );
                    }
                }
            }
        }
    }

    if let (Some(payment), Some(intent)) = (
        queries::get_payment_by_session(&conn, session_id)?,
        snapshot.intent_id.as_deref(),
    ) {
        queries::set_payment_intent(&conn, &payment.id, intent)?;
    }

    let transition = apply_transition(
        &mut conn,
        PaymentMatch::BySession(session_id),
        SettlementTarget::Succeeded,
    )?;

    let (outcome, payment) = match transition {
        Transition::Applied(p) => (EventOutcome::Applied, Some(p)),
        Transition::AlreadySettled(p) => (EventOutcome::NoOp, Some(p)),
        Transition::Unmatched => (EventOutcome::Unmatched, None),
    };
    drop(conn);

    audit(
        state,
        ActorType::Caller,
        caller,
        "verify_session",
        "payment",
        session_id,
        outcome,
        None,
    );

    Ok(VerifyOutcome {
        verified: payment
            .as_ref()
            .is_some_and(|p| p.status == PaymentStatus::Succeeded),
        status: payment.as_ref().map(|p| p.status),
        booking_id: payment.map(|p| p.booking_id),
    })
}
