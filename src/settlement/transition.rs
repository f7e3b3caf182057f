//! The shared settlement transition.
//!
//! Every trigger path - webhook reconciler, verification poller, legacy
//! processor - converges on [`apply_transition`]. There is deliberately no
//! other way to move a payment or booking between states, so the paths
//! cannot diverge or double-apply side effects.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{BookingStatus, Payment, PaymentStatus};

/// How to locate the payment: by whichever external identifier the trigger
/// path has in hand.
#[derive(Debug, Clone, Copy)]
pub enum PaymentMatch<'a> {
    BySession(&'a str),
    ByIntent(&'a str),
}

/// Settlement outcome observed at the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementTarget {
    Succeeded,
    Failed,
}

impl SettlementTarget {
    fn payment_status(self) -> PaymentStatus {
        match self {
            SettlementTarget::Succeeded => PaymentStatus::Succeeded,
            SettlementTarget::Failed => PaymentStatus::Failed,
        }
    }

    fn booking_status(self) -> BookingStatus {
        match self {
            SettlementTarget::Succeeded => BookingStatus::Confirmed,
            SettlementTarget::Failed => BookingStatus::Failed,
        }
    }
}

/// Result of one transition attempt.
#[derive(Debug)]
pub enum Transition {
    /// This call won the race and moved (payment, booking) to the target.
    Applied(Payment),
    /// The pair is already terminal; the goal state was reached earlier.
    /// Not an error - repeated deliveries and racing pollers land here.
    AlreadySettled(Payment),
    /// No payment known for the given identifier.
    Unmatched,
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

/// Atomically move the matched payment out of `initiated` and its booking
/// out of `pending`, as one logical transaction.
///
/// Both conditional updates run inside a single database transaction and
/// commit only if both guards matched; otherwise everything rolls back and
/// the call reports [`Transition::AlreadySettled`]. A payment marked
/// `succeeded` whose booking never reaches `confirmed` can therefore not be
/// observed.
pub fn apply_transition(
    conn: &mut Connection,
    matcher: PaymentMatch<'_>,
    target: SettlementTarget,
) -> Result<Transition> {
    let tx = conn.transaction()?;

    let payment = match matcher {
        PaymentMatch::BySession(session_id) => queries::get_payment_by_session(&tx, session_id)?,
        PaymentMatch::ByIntent(intent_id) => queries::get_payment_by_intent(&tx, intent_id)?,
    };
    let Some(mut payment) = payment else {
        return Ok(Transition::Unmatched);
    };

    if payment.status.is_terminal() {
        return Ok(Transition::AlreadySettled(payment));
    }

    let payment_applied = queries::conditional_update_payment(
        &tx,
        &payment.id,
        PaymentStatus::Initiated,
        target.payment_status(),
    )?;
    if !payment_applied {
        // Lost the race between our read and the guarded write.
        return Ok(Transition::AlreadySettled(payment));
    }

    let booking_applied = queries::conditional_update_booking(
        &tx,
        &payment.booking_id,
        BookingStatus::Pending,
        target.booking_status(),
    )?;
    if !booking_applied {
        // Booking already terminal: a late notification must never downgrade
        // it. Dropping the transaction rolls the payment claim back.
        return Ok(Transition::AlreadySettled(payment));
    }

    tx.commit()?;

    payment.status = target.payment_status();
    Ok(Transition::Applied(payment))
}
