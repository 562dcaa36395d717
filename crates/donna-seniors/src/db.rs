use rusqlite::{Connection, Result};

/// Initialise the seniors schema. Safe to call on every startup; in
/// production the table is owned by the admin CRUD surface and this only
/// fills in for fresh databases.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS seniors (
            id            TEXT    NOT NULL PRIMARY KEY,
            first_name    TEXT    NOT NULL,
            phone         TEXT    NOT NULL,
            timezone      TEXT    NOT NULL DEFAULT 'UTC',
            interests     TEXT    NOT NULL DEFAULT '[]',  -- JSON array
            medical_notes TEXT,
            family        TEXT,
            is_active     INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT    NOT NULL,
            updated_at    TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_seniors_phone ON seniors(phone);",
    )
}
