//! HTTP surface tests: routing, status codes, machine-readable error codes,
//! and the rate-limit guard.

mod common;

use common::*;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use charterpay::handlers;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(state: AppState) -> Router {
    handlers::router().with_state(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).expect("Response should be valid JSON")
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-caller-id", "test-caller")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (state, _gateway) = create_test_app_state();

    let response = app(state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_session_returns_session_handle() {
    let (state, _gateway) = create_test_app_state();
    let booking = {
        let conn = state.db.get().unwrap();
        create_test_booking(&conn, Decimal::new(5000, 2))
    };

    let response = app(state)
        .oneshot(post_json(
            "/payments/session",
            &json!({ "booking_id": booking.id }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["session_id"].as_str().unwrap().starts_with("ms_"));
    assert!(json["url"].as_str().unwrap().starts_with("http"));
}

#[tokio::test]
async fn test_create_session_unknown_booking_is_404() {
    let (state, _gateway) = create_test_app_state();

    let response = app(state)
        .oneshot(post_json(
            "/payments/session",
            &json!({ "booking_id": "cp_bkg_missing" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "booking_not_found");
}

#[tokio::test]
async fn test_create_session_settled_booking_is_400_with_code() {
    let (state, _gateway) = create_test_app_state();
    let booking = {
        let conn = state.db.get().unwrap();
        let booking = create_test_booking(&conn, Decimal::new(5000, 2));
        queries::conditional_update_booking(
            &conn,
            &booking.id,
            BookingStatus::Pending,
            BookingStatus::Confirmed,
        )
        .unwrap();
        booking
    };

    let response = app(state.clone())
        .oneshot(post_json(
            "/payments/session",
            &json!({ "booking_id": booking.id }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "already_settled");

    // The rejected attempt is in the audit trail with the caller identity.
    let records = audit_records_for(&state, &booking.id);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, EventOutcome::Rejected);
    assert_eq!(records[0].actor_id.as_deref(), Some("test-caller"));
}

#[tokio::test]
async fn test_webhook_requires_signature_header() {
    let (state, _gateway) = create_test_app_state();

    let response = app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/gateway")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let (state, _gateway) = create_test_app_state();

    let response = app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/gateway")
                .header("x-gateway-signature", "deadbeef")
                .body(Body::from(r#"{"type":"x","data":{"object":{"id":"y"}}}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "invalid_signature");
}

#[tokio::test]
async fn test_webhook_end_to_end_settlement() {
    let (state, gateway) = create_test_app_state();
    let booking = {
        let conn = state.db.get().unwrap();
        create_test_booking(&conn, Decimal::new(5000, 2))
    };

    // Open a session through the API.
    let response = app(state.clone())
        .oneshot(post_json(
            "/payments/session",
            &json!({ "booking_id": booking.id }),
        ))
        .await
        .unwrap();
    let session_id = body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Customer pays at the gateway; the gateway pushes its event.
    gateway.mark_paid(&session_id);
    let (payload, signature) =
        checkout_completed_event(&gateway, &session_id, None, true, Some(&booking.id));

    let response = app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/gateway")
                .header("x-gateway-signature", signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["applied"], true);

    // Verification agrees.
    let response = app(state)
        .oneshot(
            Request::builder()
                .uri(format!("/payments/verify/{}", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["verified"], true);
    assert_eq!(json["status"], "succeeded");
}

#[tokio::test]
async fn test_process_payment_endpoint() {
    let (state, _gateway) = create_test_app_state();
    let booking = {
        let conn = state.db.get().unwrap();
        let booking = create_test_booking(&conn, Decimal::new(5000, 2));
        let payment = create_test_payment(&conn, &booking.id, "sess_legacy");
        queries::set_payment_intent(&conn, &payment.id, "txn_legacy").unwrap();
        booking
    };

    let response = app(state)
        .oneshot(post_json(
            "/payments/process",
            &json!({ "transaction_id": "txn_legacy", "status": "succeeded" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["applied"], true);
    assert_eq!(json["booking_id"], booking.id);
}

#[tokio::test]
async fn test_audit_events_endpoint_filters_by_resource() {
    let (state, _gateway) = create_test_app_state();
    let booking = {
        let conn = state.db.get().unwrap();
        create_test_booking(&conn, Decimal::new(5000, 2))
    };

    app(state.clone())
        .oneshot(post_json(
            "/payments/session",
            &json!({ "booking_id": booking.id }),
        ))
        .await
        .unwrap();

    let response = app(state)
        .oneshot(
            Request::builder()
                .uri(format!("/audit/events?resource_id={}", booking.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["action"], "create_session");
    assert_eq!(records[0]["outcome"], "accepted");
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let (mut state, _gateway) = create_test_app_state();
    state.rate_limiter = Arc::new(RateLimiter::per_minute(2));
    let app = app(state);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json(
                "/payments/session",
                &json!({ "booking_id": "cp_bkg_missing" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = app
        .clone()
        .oneshot(post_json(
            "/payments/session",
            &json!({ "booking_id": "cp_bkg_missing" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(response).await;
    assert_eq!(json["code"], "rate_limited");
}

#[tokio::test]
async fn test_rate_limit_keys_are_per_caller_and_action() {
    let (mut state, _gateway) = create_test_app_state();
    state.rate_limiter = Arc::new(RateLimiter::per_minute(2));
    let app = app(state);

    // Exhaust one caller's budget for session creation.
    for _ in 0..2 {
        app.clone()
            .oneshot(post_json(
                "/payments/session",
                &json!({ "booking_id": "cp_bkg_missing" }),
            ))
            .await
            .unwrap();
    }

    // A different caller is unaffected.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/payments/session")
                .header("content-type", "application/json")
                .header("x-caller-id", "other-caller")
                .body(Body::from(r#"{"booking_id":"cp_bkg_missing"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // And so is the same caller on a different action.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/audit/events")
                .header("x-caller-id", "test-caller")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
