//! Verification poller tests: read-only probe for unpaid sessions, settlement
//! convergence with the webhook path, and reconciliation-gap recovery.

mod common;

use common::*;

use charterpay::error::AppError;
use charterpay::settlement;
use rust_decimal::Decimal;

async fn booking_with_session(state: &AppState) -> (Booking, String) {
    let booking = {
        let conn = state.db.get().unwrap();
        create_test_booking(&conn, Decimal::new(5000, 2))
    };
    let created = settlement::create_session(state, None, &booking.id, None, None)
        .await
        .unwrap();
    (booking, created.session_id)
}

#[tokio::test]
async fn test_unpaid_session_is_read_only_probe() {
    let (state, _gateway) = create_test_app_state();
    let (booking, session_id) = booking_with_session(&state).await;

    let outcome = settlement::verify_session(&state, None, &session_id)
        .await
        .unwrap();

    assert!(!outcome.verified);
    assert_eq!(outcome.status, Some(PaymentStatus::Initiated));
    assert_eq!(outcome.booking_id.as_deref(), Some(booking.id.as_str()));

    // Nothing moved.
    let conn = state.db.get().unwrap();
    let booking = queries::get_booking(&conn, &booking.id).unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
}

#[tokio::test]
async fn test_paid_session_settles_on_verify() {
    let (state, gateway) = create_test_app_state();
    let (booking, session_id) = booking_with_session(&state).await;
    let intent_id = gateway.mark_paid(&session_id).unwrap();

    let outcome = settlement::verify_session(&state, Some("caller-1"), &session_id)
        .await
        .unwrap();

    assert!(outcome.verified);
    assert_eq!(outcome.status, Some(PaymentStatus::Succeeded));

    let conn = state.db.get().unwrap();
    let payment = queries::get_payment_by_session(&conn, &session_id)
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert_eq!(payment.intent_id.as_deref(), Some(intent_id.as_str()));
    let booking = queries::get_booking(&conn, &booking.id).unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    drop(conn);

    let records = audit_records_for(&state, &session_id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, "verify_session");
    assert_eq!(records[0].outcome, EventOutcome::Applied);
}

#[tokio::test]
async fn test_verify_after_webhook_is_noop() {
    // Webhook settles first; a later poll observes the terminal state and
    // reports verified without re-applying anything.
    let (state, gateway) = create_test_app_state();
    let (booking, session_id) = booking_with_session(&state).await;
    gateway.mark_paid(&session_id);

    let (payload, signature) =
        checkout_completed_event(&gateway, &session_id, None, true, Some(&booking.id));
    let ack = settlement::handle_event(&state, &payload, &signature)
        .await
        .unwrap();
    assert!(ack.applied);

    let outcome = settlement::verify_session(&state, None, &session_id)
        .await
        .unwrap();
    assert!(outcome.verified);

    let records = audit_records_for(&state, &session_id);
    let noop = records
        .iter()
        .find(|r| r.action == "verify_session")
        .unwrap();
    assert_eq!(noop.outcome, EventOutcome::NoOp);
}

#[tokio::test]
async fn test_repeated_verification_is_stable() {
    let (state, gateway) = create_test_app_state();
    let (_booking, session_id) = booking_with_session(&state).await;
    gateway.mark_paid(&session_id);

    let first = settlement::verify_session(&state, None, &session_id)
        .await
        .unwrap();
    let second = settlement::verify_session(&state, None, &session_id)
        .await
        .unwrap();

    assert!(first.verified);
    assert!(second.verified);
    assert_eq!(second.status, Some(PaymentStatus::Succeeded));
}

#[tokio::test]
async fn test_unknown_session_not_found() {
    let (state, _gateway) = create_test_app_state();

    let result = settlement::verify_session(&state, None, "ms_unknown").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_gap_recovery_recreates_payment_row() {
    // The session exists at the gateway but the local payment row was never
    // written (crash after gateway call). Verification must recreate the row
    // from session metadata and settle it.
    let (state, gateway) = create_test_app_state();
    let booking = {
        let conn = state.db.get().unwrap();
        create_test_booking(&conn, Decimal::new(77_700, 2))
    };

    let session = gateway
        .create_session(&CreateSessionRequest {
            amount_minor: 77_700,
            currency: "usd".to_string(),
            booking_id: booking.id.clone(),
            payer_id: None,
            success_url: "http://localhost:3000/payments/success".to_string(),
            cancel_url: "http://localhost:3000/payments/cancel".to_string(),
        })
        .await
        .unwrap();
    gateway.mark_paid(&session.id);

    // No local payment row exists yet.
    {
        let conn = state.db.get().unwrap();
        assert!(queries::get_payment_by_session(&conn, &session.id)
            .unwrap()
            .is_none());
    }

    let outcome = settlement::verify_session(&state, None, &session.id)
        .await
        .unwrap();
    assert!(outcome.verified);

    let conn = state.db.get().unwrap();
    let payment = queries::get_payment_by_session(&conn, &session.id)
        .unwrap()
        .unwrap();
    assert_eq!(payment.booking_id, booking.id);
    assert_eq!(payment.amount_minor, 77_700);
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    let booking = queries::get_booking(&conn, &booking.id).unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn test_gap_recovery_skipped_for_unknown_booking() {
    // Paid session whose metadata points at a booking we do not have: nothing
    // to recover against, the poll reports unverified.
    let (state, gateway) = create_test_app_state();

    let session = gateway
        .create_session(&CreateSessionRequest {
            amount_minor: 5000,
            currency: "usd".to_string(),
            booking_id: "cp_bkg_not_ours".to_string(),
            payer_id: None,
            success_url: "http://localhost:3000/payments/success".to_string(),
            cancel_url: "http://localhost:3000/payments/cancel".to_string(),
        })
        .await
        .unwrap();
    gateway.mark_paid(&session.id);

    let outcome = settlement::verify_session(&state, None, &session.id)
        .await
        .unwrap();
    assert!(!outcome.verified);
    assert_eq!(outcome.status, None);

    let records = audit_records_for(&state, &session.id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, EventOutcome::Unmatched);
}
