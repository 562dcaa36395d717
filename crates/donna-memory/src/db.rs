use rusqlite::{Connection, Result};

/// Initialise the memory tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            id               TEXT    NOT NULL PRIMARY KEY,
            senior_id        TEXT    NOT NULL,
            type             TEXT    NOT NULL,
            content          TEXT    NOT NULL,
            embedding        BLOB    NOT NULL,   -- 1536 × f32 little-endian
            importance       REAL    NOT NULL,
            created_at       TEXT    NOT NULL,
            last_accessed_at TEXT    NOT NULL,
            access_count     INTEGER NOT NULL DEFAULT 0,
            source_call_id   TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_memories_senior ON memories(senior_id);

        CREATE TABLE IF NOT EXISTS daily_call_context (
            senior_id   TEXT NOT NULL,
            local_date  TEXT NOT NULL,              -- YYYY-MM-DD in senior tz
            topics      TEXT NOT NULL DEFAULT '[]', -- JSON arrays
            reminders   TEXT NOT NULL DEFAULT '[]',
            advice      TEXT NOT NULL DEFAULT '[]',
            key_moments TEXT NOT NULL DEFAULT '[]',
            summaries   TEXT NOT NULL DEFAULT '[]',
            call_count  INTEGER NOT NULL DEFAULT 0,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (senior_id, local_date)
        );",
    )
}

/// Encode an embedding as a little-endian f32 blob.
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Decode a little-endian f32 blob back into an embedding.
pub fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
