use rusqlite::Connection;

/// Initialize the main ledger schema (bookings and payments).
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Bookings (created by the upstream booking flow in 'pending';
        -- status mutated only through the settlement transition)
        CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            amount TEXT NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'confirmed', 'failed')),
            payer_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bookings_status ON bookings(status);

        -- Payments (one row per gateway session; at most one 'succeeded'
        -- per booking, enforced at session creation time)
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            booking_id TEXT NOT NULL REFERENCES bookings(id),
            session_id TEXT NOT NULL UNIQUE,
            intent_id TEXT,
            amount_minor INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('initiated', 'succeeded', 'failed')),
            gateway_response TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payments_booking ON payments(booking_id);
        -- Unique: one payment per gateway transaction id (NULLs exempt)
        CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_intent ON payments(intent_id);
        "#,
    )?;
    Ok(())
}

/// Initialize the audit trail schema (separate DB file).
/// Optimized for append-only workload with WAL mode.
pub fn init_audit_db(conn: &Connection) -> rusqlite::Result<()> {
    // WAL mode: writes are sequential appends, much faster for append-only workloads
    // synchronous=NORMAL: safe with WAL, faster than FULL
    // journal_size_limit: prevent WAL from growing indefinitely
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 1000;
        PRAGMA journal_size_limit = 67108864;

        CREATE TABLE IF NOT EXISTS event_records (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_type TEXT NOT NULL CHECK (actor_type IN ('system', 'caller')),
            actor_id TEXT,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            outcome TEXT NOT NULL,
            metadata TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_event_records_timestamp ON event_records(timestamp);
        CREATE INDEX IF NOT EXISTS idx_event_records_resource ON event_records(resource_type, resource_id);
        CREATE INDEX IF NOT EXISTS idx_event_records_action ON event_records(action);
        "#,
    )?;
    Ok(())
}
