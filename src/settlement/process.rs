//! Legacy settlement path for non-webhook sources.
//!
//! Back-office tools and older integrations report settlement outcomes by
//! gateway transaction id. This is a thin shim over the shared transition,
//! not a second pipeline: identical guards, identical terminal semantics.

use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::models::{ActorType, EventOutcome};

use super::transition::{apply_transition, PaymentMatch, SettlementTarget, Transition};
use super::audit;

#[derive(Debug, Deserialize)]
pub struct ProcessPaymentInput {
    pub transaction_id: String,
    /// "succeeded" or "failed".
    pub status: String,
    /// Opaque gateway metadata, snapshotted onto the payment for audit.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ProcessOutcome {
    pub applied: bool,
    pub booking_id: String,
}

/// Apply a settlement outcome reported outside the webhook channel.
pub fn process_payment(
    state: &AppState,
    caller: Option<&str>,
    input: &ProcessPaymentInput,
) -> Result<ProcessOutcome> {
    let target = match input.status.as_str() {
        "succeeded" => SettlementTarget::Succeeded,
        "failed" => SettlementTarget::Failed,
        other => {
            return Err(AppError::BadRequest(format!(
                "Unknown settlement status: {}",
                other
            )))
        }
    };

    let mut conn = state.db.get()?;
    let transition = apply_transition(
        &mut conn,
        PaymentMatch::ByIntent(&input.transaction_id),
        target,
    )?;

    let (applied, payment) = match transition {
        Transition::Applied(p) => (true, p),
        Transition::AlreadySettled(p) => (false, p),
        Transition::Unmatched => {
            audit(
                state,
                ActorType::Caller,
                caller,
                "process_payment",
                "payment",
                &input.transaction_id,
                EventOutcome::Unmatched,
                None,
            );
            return Err(AppError::NotFound(format!(
                "No payment for transaction: {}",
                input.transaction_id
            )));
        }
    };

    if let Some(ref metadata) = input.metadata {
        if let Err(e) =
            queries::set_payment_gateway_response(&conn, &payment.id, &metadata.to_string())
        {
            tracing::warn!("failed to snapshot gateway metadata: {}", e);
        }
    }
    drop(conn);

    audit(
        state,
        ActorType::Caller,
        caller,
        "process_payment",
        "payment",
        &payment.id,
        if applied {
            EventOutcome::Applied
        } else {
            EventOutcome::NoOp
        },
        Some(&serde_json::json!({
            "transaction_id": input.transaction_id,
            "status": input.status,
        })),
    );

    Ok(ProcessOutcome {
        applied,
        booking_id: payment.booking_id,
    })
}
