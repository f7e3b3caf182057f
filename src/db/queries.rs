//! Ledger and audit queries.
//!
//! All status writes go through the conditional-update functions; no caller
//! is permitted to write booking or payment status unconditionally. The
//! `UPDATE ... WHERE status = :from` compare-and-swap is the sole
//! synchronization primitive for settlement.

use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::id::EntityType;
use crate::models::{
    ActorType, Booking, BookingStatus, CreateBooking, CreatePayment, EventOutcome, EventRecord,
    EventRecordQuery, Payment, PaymentStatus,
};

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Map a stored text column through `FromStr`, surfacing bad data as a
/// conversion failure instead of a panic.
fn parse_column<T: FromStr>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

// ============ Bookings ============

const BOOKING_COLS: &str = "id, amount, currency, status, payer_id, created_at, updated_at";

fn booking_from_row(row: &Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: row.get(0)?,
        amount: parse_column::<Decimal>(row, 1)?,
        currency: row.get(2)?,
        status: parse_column::<BookingStatus>(row, 3)?,
        payer_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Booking creation belongs to the upstream flow; kept here for seeding and
/// tests. Bookings always start in `pending`.
pub fn create_booking(conn: &Connection, input: &CreateBooking) -> Result<Booking> {
    let id = EntityType::Booking.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO bookings (id, amount, currency, status, payer_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?5)",
        params![&id, input.amount.to_string(), &input.currency, &input.payer_id, now],
    )?;

    Ok(Booking {
        id,
        amount: input.amount,
        currency: input.currency.clone(),
        status: BookingStatus::Pending,
        payer_id: input.payer_id.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_booking(conn: &Connection, id: &str) -> Result<Option<Booking>> {
    let booking = conn
        .query_row(
            &format!("SELECT {} FROM bookings WHERE id = ?1", BOOKING_COLS),
            params![id],
            booking_from_row,
        )
        .optional()?;
    Ok(booking)
}

/// Atomically move a booking `from -> to`, returning whether the row was
/// actually updated. An already-terminal booking leaves the guard unmatched
/// and the call reports `false`.
pub fn conditional_update_booking(
    conn: &Connection,
    id: &str,
    from: BookingStatus,
    to: BookingStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![to.as_ref(), now(), id, from.as_ref()],
    )?;
    Ok(affected > 0)
}

// ============ Payments ============

const PAYMENT_COLS: &str = "id, booking_id, session_id, intent_id, amount_minor, currency, \
                            status, gateway_response, created_at, updated_at";

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        session_id: row.get(2)?,
        intent_id: row.get(3)?,
        amount_minor: row.get(4)?,
        currency: row.get(5)?,
        status: parse_column::<PaymentStatus>(row, 6)?,
        gateway_response: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub fn create_payment(conn: &Connection, input: &CreatePayment) -> Result<Payment> {
    let id = EntityType::Payment.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO payments (id, booking_id, session_id, amount_minor, currency, status,
                               created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'initiated', ?6, ?6)",
        params![&id, &input.booking_id, &input.session_id, input.amount_minor, &input.currency, now],
    )?;

    Ok(Payment {
        id,
        booking_id: input.booking_id.clone(),
        session_id: input.session_id.clone(),
        intent_id: None,
        amount_minor: input.amount_minor,
        currency: input.currency.clone(),
        status: PaymentStatus::Initiated,
        gateway_response: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_payment_by_session(conn: &Connection, session_id: &str) -> Result<Option<Payment>> {
    let payment = conn
        .query_row(
            &format!("SELECT {} FROM payments WHERE session_id = ?1", PAYMENT_COLS),
            params![session_id],
            payment_from_row,
        )
        .optional()?;
    Ok(payment)
}

pub fn get_payment_by_intent(conn: &Connection, intent_id: &str) -> Result<Option<Payment>> {
    let payment = conn
        .query_row(
            &format!("SELECT {} FROM payments WHERE intent_id = ?1", PAYMENT_COLS),
            params![intent_id],
            payment_from_row,
        )
        .optional()?;
    Ok(payment)
}

/// Whether the booking already has a settled-successful payment. Used as the
/// creation-time double-charge guard.
pub fn booking_has_succeeded_payment(conn: &Connection, booking_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM payments WHERE booking_id = ?1 AND status = 'succeeded'",
        params![booking_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Record the gateway transaction id once the gateway assigns it. Write-once:
/// an already-set intent id is left untouched.
pub fn set_payment_intent(conn: &Connection, payment_id: &str, intent_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE payments SET intent_id = ?1, updated_at = ?2 WHERE id = ?3 AND intent_id IS NULL",
        params![intent_id, now(), payment_id],
    )?;
    Ok(())
}

/// Store the raw gateway response snapshot for audit/debug. Not used for logic.
pub fn set_payment_gateway_response(
    conn: &Connection,
    payment_id: &str,
    response: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE payments SET gateway_response = ?1, updated_at = ?2 WHERE id = ?3",
        params![response, now(), payment_id],
    )?;
    Ok(())
}

/// Atomically move a payment out of `initiated`, returning whether the claim
/// was successful.
///
/// Uses compare-and-swap so that repeated webhook deliveries and a racing
/// poller are both safe: whichever call wins applies the transition, the
/// loser observes `false` and treats the goal state as already reached.
pub fn conditional_update_payment(
    conn: &Connection,
    id: &str,
    from: PaymentStatus,
    to: PaymentStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payments SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![to.as_ref(), now(), id, from.as_ref()],
    )?;
    Ok(affected > 0)
}

// ============ Event records (audit trail) ============

/// Append one immutable event record.
///
/// When audit logging is disabled the record is still constructed and
/// returned so callers can log it, but no row is written.
#[allow(clippy::too_many_arguments)]
pub fn append_event_record(
    conn: &Connection,
    enabled: bool,
    actor_type: ActorType,
    actor_id: Option<&str>,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    outcome: EventOutcome,
    metadata: Option<&serde_json::Value>,
) -> Result<EventRecord> {
    let id = EntityType::EventRecord.gen_id();
    let timestamp = now();

    let record = EventRecord {
        id: id.clone(),
        timestamp,
        actor_type,
        actor_id: actor_id.map(String::from),
        action: action.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        outcome,
        metadata: metadata.cloned(),
    };

    if !enabled {
        return Ok(record);
    }

    conn.execute(
        "INSERT INTO event_records (id, timestamp, actor_type, actor_id, action,
                                    resource_type, resource_id, outcome, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            timestamp,
            actor_type.as_ref(),
            actor_id,
            action,
            resource_type,
            resource_id,
            outcome.as_ref(),
            metadata.map(|m| m.to_string()),
        ],
    )?;

    Ok(record)
}

fn event_record_from_row(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    let metadata: Option<String> = row.get(8)?;
    Ok(EventRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        actor_type: parse_column::<ActorType>(row, 2)?,
        actor_id: row.get(3)?,
        action: row.get(4)?,
        resource_type: row.get(5)?,
        resource_id: row.get(6)?,
        outcome: parse_column::<EventOutcome>(row, 7)?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
    })
}

/// Forensic query over the audit trail, newest first.
pub fn list_event_records(conn: &Connection, query: &EventRecordQuery) -> Result<Vec<EventRecord>> {
    let mut sql = String::from(
        "SELECT id, timestamp, actor_type, actor_id, action, resource_type, resource_id, \
         outcome, metadata FROM event_records WHERE 1=1",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref action) = query.action {
        sql.push_str(" AND action = ?");
        params_vec.push(Box::new(action.clone()));
    }
    if let Some(ref resource_id) = query.resource_id {
        sql.push_str(" AND resource_id = ?");
        params_vec.push(Box::new(resource_id.clone()));
    }
    if let Some(from) = query.from_timestamp {
        sql.push_str(" AND timestamp >= ?");
        params_vec.push(Box::new(from));
    }
    if let Some(to) = query.to_timestamp {
        sql.push_str(" AND timestamp <= ?");
        params_vec.push(Box::new(to));
    }

    sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");
    params_vec.push(Box::new(query.limit()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
        event_record_from_row,
    )?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}
