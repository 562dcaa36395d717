use rusqlite::{Connection, Result};

/// Initialise the post-call tables (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id            TEXT    NOT NULL PRIMARY KEY,
            call_id       TEXT    NOT NULL,
            senior_id     TEXT    NOT NULL,
            call_type     TEXT    NOT NULL,
            started_at    TEXT    NOT NULL,
            duration_secs INTEGER NOT NULL,
            status        TEXT    NOT NULL,   -- termination reason
            transcript    TEXT    NOT NULL,
            created_at    TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_senior
            ON conversations(senior_id, created_at DESC);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_call
            ON conversations(call_id);

        CREATE TABLE IF NOT EXISTS call_analyses (
            id           TEXT NOT NULL PRIMARY KEY,
            call_id      TEXT NOT NULL,
            senior_id    TEXT NOT NULL,
            analysis     TEXT NOT NULL,       -- JSON CallAnalysis
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_analyses_call ON call_analyses(call_id);",
    )
}
