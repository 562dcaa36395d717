use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use crate::analysis::CallAnalysis;
use crate::db::init_db;
use crate::error::Result;

/// Persists completed conversations and their analyses.
pub struct ConversationStore {
    db: Mutex<Connection>,
}

impl ConversationStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Step 1 of post-call: record the completed conversation. Idempotent
    /// per call id.
    #[allow(clippy::too_many_arguments)]
    pub fn record_conversation(
        &self,
        call_id: &str,
        senior_id: &str,
        call_type: &str,
        started_at: &str,
        duration_secs: u64,
        status: &str,
        transcript: &str,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO conversations
             (id, call_id, senior_id, call_type, started_at, duration_secs, status,
              transcript, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                call_id,
                senior_id,
                call_type,
                started_at,
                duration_secs as i64,
                status,
                transcript,
                Utc::now().to_rfc3339(),
            ],
        )?;
        info!(call_id, senior_id, duration_secs, "conversation persisted");
        Ok(())
    }

    /// Step 3: save the AI analysis alongside the conversation.
    pub fn save_analysis(
        &self,
        call_id: &str,
        senior_id: &str,
        analysis: &CallAnalysis,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO call_analyses (id, call_id, senior_id, analysis, created_at)
             VALUES (?1,?2,?3,?4,?5)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                call_id,
                senior_id,
                serde_json::to_string(analysis)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn analysis_for_call(&self, call_id: &str) -> Result<Option<CallAnalysis>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT analysis FROM call_analyses WHERE call_id = ?1 ORDER BY created_at DESC",
            [call_id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(json) => Ok(serde_json::from_str(&json).ok()),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
