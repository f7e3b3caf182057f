//! Settlement reconciliation core.
//!
//! Three trigger paths - session initiation, webhook reconciliation, and
//! synchronous verification - plus the legacy processor, all converging on
//! the shared transition in [`transition`].

mod initiator;
mod poller;
mod process;
mod reconciler;
pub mod transition;

pub use initiator::{create_session, CreatedSession};
pub use poller::{verify_session, VerifyOutcome};
pub use process::{process_payment, ProcessOutcome, ProcessPaymentInput};
pub use reconciler::{handle_event, EventAck};

use crate::db::{queries, AppState};
use crate::models::{ActorType, EventOutcome};

/// Append a best-effort event record.
///
/// Audit writes are a side channel: a failure here must never block the
/// settlement action itself, but it is surfaced in operational logs.
#[allow(clippy::too_many_arguments)]
pub(crate) fn audit(
    state: &AppState,
    actor_type: ActorType,
    actor_id: Option<&str>,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    outcome: EventOutcome,
    metadata: Option<&serde_json::Value>,
) {
    let conn = match state.audit.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("audit pool unavailable, dropping {} record: {}", action, e);
            return;
        }
    };

    if let Err(e) = queries::append_event_record(
        &conn,
        state.audit_log_enabled,
        actor_type,
        actor_id,
        action,
        resource_type,
        resource_id,
        outcome,
        metadata,
    ) {
        tracing::warn!("failed to append {} event record: {}", action, e);
    }
}
