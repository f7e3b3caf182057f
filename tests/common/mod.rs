//! Test utilities and fixtures for Charterpay integration tests

#![allow(dead_code)]

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub use charterpay::db::{init_audit_db, init_db, queries, AppState, DbPool};
pub use charterpay::gateway::{CreateSessionRequest, GatewayClient, MockGateway};
pub use charterpay::models::*;
pub use charterpay::rate_limit::RateLimiter;

use rust_decimal::Decimal;

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create an in-memory test audit database with schema initialized
pub fn setup_test_audit_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory audit database");
    init_audit_db(&conn).expect("Failed to initialize audit schema");
    conn
}

/// In-memory pool for tests. Capped at one connection: each in-memory
/// connection is its own database, so a larger pool would hand out blank
/// databases.
fn memory_pool(init: fn(&Connection) -> rusqlite::Result<()>) -> DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init(&conn).unwrap();
    }
    pool
}

/// Create an AppState for testing with in-memory databases and the mock
/// gateway. The concrete gateway handle is returned alongside so tests can
/// settle sessions and sign event payloads.
pub fn create_test_app_state() -> (AppState, Arc<MockGateway>) {
    let gateway = Arc::new(MockGateway::new(
        "test_webhook_secret",
        "http://localhost:3000",
    ));

    let state = AppState {
        db: memory_pool(init_db),
        audit: memory_pool(init_audit_db),
        gateway: gateway.clone(),
        rate_limiter: Arc::new(RateLimiter::per_minute(1000)),
        audit_log_enabled: true,
        base_url: "http://localhost:3000".to_string(),
    };

    (state, gateway)
}

/// Create a pending test booking
pub fn create_test_booking(conn: &Connection, amount: Decimal) -> Booking {
    let input = CreateBooking {
        amount,
        currency: "usd".to_string(),
        payer_id: Some("test-payer".to_string()),
    };
    queries::create_booking(conn, &input).expect("Failed to create test booking")
}

/// Create an initiated test payment for a booking
pub fn create_test_payment(conn: &Connection, booking_id: &str, session_id: &str) -> Payment {
    let input = CreatePayment {
        booking_id: booking_id.to_string(),
        session_id: session_id.to_string(),
        amount_minor: 5000,
        currency: "usd".to_string(),
    };
    queries::create_payment(conn, &input).expect("Failed to create test payment")
}

/// Signed `checkout.session.completed` payload for the mock gateway
pub fn checkout_completed_event(
    gateway: &MockGateway,
    session_id: &str,
    intent_id: Option<&str>,
    paid: bool,
    booking_id: Option<&str>,
) -> (Vec<u8>, String) {
    let payload = serde_json::json!({
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "payment_status": if paid { "paid" } else { "unpaid" },
                "payment_intent": intent_id,
                "metadata": { "booking_id": booking_id },
            }
        }
    });
    let bytes = serde_json::to_vec(&payload).unwrap();
    let signature = gateway.sign(&bytes);
    (bytes, signature)
}

/// Signed intent-level payload (`payment_intent.succeeded` or
/// `payment_intent.payment_failed`) for the mock gateway
pub fn intent_event(
    gateway: &MockGateway,
    event_type: &str,
    intent_id: &str,
    session_id: Option<&str>,
) -> (Vec<u8>, String) {
    let payload = serde_json::json!({
        "type": event_type,
        "data": {
            "object": {
                "id": intent_id,
                "session": session_id,
            }
        }
    });
    let bytes = serde_json::to_vec(&payload).unwrap();
    let signature = gateway.sign(&bytes);
    (bytes, signature)
}

/// All audit records for a resource, newest first
pub fn audit_records_for(state: &AppState, resource_id: &str) -> Vec<EventRecord> {
    let conn = state.audit.get().unwrap();
    queries::list_event_records(
        &conn,
        &EventRecordQuery {
            resource_id: Some(resource_id.to_string()),
            ..Default::default()
        },
    )
    .unwrap()
}
