//! Session initiation: the entry point that turns a pending booking into a
//! gateway checkout session and an `initiated` payment row.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::gateway::CreateSessionRequest;
use crate::models::{ActorType, Booking, BookingStatus, CreatePayment, EventOutcome};

use super::audit;

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub session_id: String,
    pub url: String,
}

/// Convert the booking's decimal amount to gateway-safe integer minor units.
///
/// A non-positive or non-representable result is a fatal `InvalidAmount`,
/// never silently coerced to zero or skipped.
pub(crate) fn to_minor_units(booking: &Booking) -> Result<i64> {
    // checked_mul: near-max decimals overflow the multiplication itself.
    let minor = booking
        .amount
        .checked_mul(Decimal::from(100))
        .ok_or_else(|| {
            AppError::InvalidAmount(format!("amount {} out of range", booking.amount))
        })?;

    if minor.fract() != Decimal::ZERO {
        return Err(AppError::InvalidAmount(format!(
            "amount {} has sub-cent precision",
            booking.amount
        )));
    }

    let minor = minor
        .to_i64()
        .ok_or_else(|| AppError::InvalidAmount(format!("amount {} out of range", booking.amount)))?;

    if minor <= 0 {
        return Err(AppError::InvalidAmount(format!(
            "amount {} is not positive",
            booking.amount
        )));
    }

    Ok(minor)
}

/// Create a payment session for a booking.
///
/// Preconditions: the booking exists and is `pending`. A `confirmed` booking
/// fails with `AlreadySettled` - the first idempotency guard, preventing a
/// duplicate charge attempt on a paid booking.
///
/// The payment row is persisted before returning. If that persistence fails
/// after the gateway session was created, the session handle is still
/// returned (the session exists at the gateway) and an elevated
/// `reconciliation_gap` record is appended so the session can be recovered
/// later through the verification poller.
pub async fn create_session(
    state: &AppState,
    caller: Option<&str>,
    booking_id: &str,
    success_url: Option<&str>,
    cancel_url: Option<&str>,
) -> Result<CreatedSession> {
    let conn = state.db.get()?;

    let booking = queries::get_booking(&conn, booking_id)?
        .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))?;

    match booking.status {
        BookingStatus::Pending => {}
        BookingStatus::Confirmed => return Err(AppError::AlreadySettled),
        BookingStatus::Failed => {
            return Err(AppError::BadRequest("Booking is no longer payable".into()))
        }
    }

    // Creation-time double-charge guard: additional attempts after a terminal
    // success are rejected here, not reconciled later.
    if queries::booking_has_succeeded_payment(&conn, booking_id)? {
        return Err(AppError::AlreadySettled);
    }

    let amount_minor = to_minor_units(&booking)?;

    let request = CreateSessionRequest {
        amount_minor,
        currency: booking.currency.to_lowercase(),
        booking_id: booking.id.clone(),
        payer_id: booking.payer_id.clone(),
        success_url: success_url
            .map(String::from)
            .unwrap_or_else(|| format!("{}/payments/success", state.base_url)),
        cancel_url: cancel_url
            .map(String::from)
            .unwrap_or_else(|| format!("{}/payments/cancel", state.base_url)),
    };

    let session = state.gateway.create_session(&request).await?;

    // Persist before returning success. A failure here must not lose the
    // session: it already exists at the gateway and money may move.
    let persisted = queries::create_payment(
        &conn,
        &CreatePayment {
            booking_id: booking.id.clone(),
            session_id: session.id.clone(),
            amount_minor,
            currency: request.currency.clone(),
        },
    );

    match persisted {
        Ok(payment) => {
            tracing::info!(
                "payment session created: booking={}, payment={}, session={}",
                booking.id,
                payment.id,
                session.id
            );
            audit(
                state,
                ActorType::Caller,
                caller,
                "create_session",
                "booking",
                &booking.id,
                EventOutcome::Accepted,
                Some(&serde_json::json!({
                    "session_id": session.id,
                    "payment_id": payment.id,
                    "amount_minor": amount_minor,
                    "currency": request.currency,
                })),
            );
        }
        Err(e) => {
            tracing::error!(
                "payment row not persisted for gateway session {} (booking {}): {}",
                session.id,
                booking.id,
                e
            );
            audit(
                state,
                ActorType::System,
                None,
                "create_session",
                "booking",
                &booking.id,
                EventOutcome::ReconciliationGap,
                Some(&serde_json::json!({
                    "session_id": session.id,
                    "amount_minor": amount_minor,
                    "currency": request.currency,
                })),
            );
        }
    }

    Ok(CreatedSession {
        session_id: session.id,
        url: session.url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn booking_with_amount(amount: Decimal) -> Booking {
        Booking {
            id: "cp_bkg_00000000000000000000000000000000".into(),
            amount,
            currency: "USD".into(),
            status: BookingStatus::Pending,
            payer_id: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_minor_units_whole_dollars() {
        assert_eq!(to_minor_units(&booking_with_amount(dec!(50.00))).unwrap(), 5000);
        assert_eq!(to_minor_units(&booking_with_amount(dec!(0.01))).unwrap(), 1);
        assert_eq!(to_minor_units(&booking_with_amount(dec!(1250))).unwrap(), 125_000);
    }

    #[test]
    fn test_minor_units_rejects_non_positive() {
        assert!(matches!(
            to_minor_units(&booking_with_amount(dec!(0))),
            Err(AppError::InvalidAmount(_))
        ));
        assert!(matches!(
            to_minor_units(&booking_with_amount(dec!(-10.00))),
            Err(AppError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_minor_units_rejects_overflowing_amount() {
        // Representable as a Decimal, but *100 overflows.
        assert!(matches!(
            to_minor_units(&booking_with_amount(Decimal::MAX)),
            Err(AppError::InvalidAmount(_))
        ));
        // Fits the multiplication but not i64 minor units.
        assert!(matches!(
            to_minor_units(&booking_with_amount(dec!(100000000000000000))),
            Err(AppError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_minor_units_rejects_sub_cent() {
        assert!(matches!(
            to_minor_units(&booking_with_amount(dec!(10.005))),
            Err(AppError::InvalidAmount(_))
        ));
    }
}
