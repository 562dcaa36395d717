use rusqlite::{Connection, Result};

/// Initialise the scheduler schema (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reminders (
            id         TEXT    NOT NULL PRIMARY KEY,
            senior_id  TEXT    NOT NULL,
            type       TEXT    NOT NULL,
            title      TEXT    NOT NULL,
            description TEXT   NOT NULL DEFAULT '',
            schedule   TEXT    NOT NULL,   -- JSON-encoded Recurrence
            is_active  INTEGER NOT NULL DEFAULT 1,
            created_at TEXT    NOT NULL,
            updated_at TEXT    NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_reminders_senior ON reminders (senior_id, is_active);

        CREATE TABLE IF NOT EXISTS reminder_deliveries (
            id            TEXT    NOT NULL PRIMARY KEY,
            reminder_id   TEXT    NOT NULL,
            scheduled_for TEXT    NOT NULL,  -- instance instant, RFC 3339
            delivered_at  TEXT,
            call_id       TEXT,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            status        TEXT    NOT NULL,
            user_response TEXT
        ) STRICT;
        -- the instance identity: one delivery chain per occurrence
        CREATE UNIQUE INDEX IF NOT EXISTS idx_deliveries_instance
            ON reminder_deliveries (reminder_id, scheduled_for);
        CREATE INDEX IF NOT EXISTS idx_deliveries_status ON reminder_deliveries (status);
        ",
    )?;
    Ok(())
}
