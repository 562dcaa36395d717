use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::types::{DeliveryRecord, DeliveryStatus, Recurrence, Reminder, ReminderType};

/// CRUD over reminder definitions. Shares its connection with the delivery
/// store; both wrap the same mutex.
pub struct ReminderStore {
    conn: Arc<Mutex<Connection>>,
}

impl ReminderStore {
    pub fn new(conn: Connection) -> Result<(Self, DeliveryStore)> {
        init_db(&conn)?;
        let shared = Arc::new(Mutex::new(conn));
        Ok((
            Self {
                conn: Arc::clone(&shared),
            },
            DeliveryStore { conn: shared },
        ))
    }

    pub fn add(
        &self,
        senior_id: &str,
        reminder_type: ReminderType,
        title: &str,
        description: &str,
        schedule: Recurrence,
    ) -> Result<Reminder> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let schedule_json = serde_json::to_string(&schedule)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO reminders
             (id, senior_id, type, title, description, schedule, is_active, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,1,?7,?7)",
            rusqlite::params![
                id,
                senior_id,
                reminder_type.to_string(),
                title,
                description,
                schedule_json,
                now
            ],
        )?;
        info!(reminder_id = %id, senior_id, %title, "reminder added");
        Ok(Reminder {
            id,
            senior_id: senior_id.to_string(),
            reminder_type,
            title: title.to_string(),
            description: description.to_string(),
            schedule,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn deactivate(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE reminders SET is_active = 0, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![Utc::now().to_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(SchedulerError::ReminderNotFound { id: id.to_string() });
        }
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM reminders WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::ReminderNotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// All active reminders, across seniors — the poll set.
    pub fn active(&self) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, senior_id, type, title, description, schedule, is_active,
                    created_at, updated_at
             FROM reminders WHERE is_active = 1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_reminder)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn active_for_senior(&self, senior_id: &str) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, senior_id, type, title, description, schedule, is_active,
                    created_at, updated_at
             FROM reminders WHERE is_active = 1 AND senior_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([senior_id], row_to_reminder)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_reminder(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reminder> {
    let type_str: String = row.get(2)?;
    let schedule_json: String = row.get(5)?;
    Ok(Reminder {
        id: row.get(0)?,
        senior_id: row.get(1)?,
        reminder_type: type_str.parse().unwrap_or(ReminderType::Custom),
        title: row.get(3)?,
        description: row.get(4)?,
        schedule: serde_json::from_str(&schedule_json).unwrap_or(Recurrence::Once {
            at: DateTime::<Utc>::MIN_UTC,
        }),
        is_active: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// The delivery-record side of the state machine. Every status change goes
/// through [`transition`](Self::transition), which enforces legality.
pub struct DeliveryStore {
    conn: Arc<Mutex<Connection>>,
}

impl DeliveryStore {
    /// First attempt for an instance: a fresh record in `delivered`. The
    /// unique instance index makes a double-fire within a poll interval a
    /// no-op returning the existing record.
    pub fn record_attempt(
        &self,
        reminder_id: &str,
        scheduled_for: DateTime<Utc>,
        call_id: &str,
    ) -> Result<DeliveryRecord> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let existing: Option<DeliveryRecord> = conn
            .query_row(
                "SELECT id, reminder_id, scheduled_for, delivered_at, call_id,
                        attempt_count, status, user_response
                 FROM reminder_deliveries
                 WHERE reminder_id = ?1 AND scheduled_for = ?2",
                rusqlite::params![reminder_id, scheduled_for.to_rfc3339()],
                row_to_delivery,
            )
            .ok();

        if let Some(record) = existing {
            debug!(delivery_id = %record.id, "instance already has a delivery record");
            return Ok(record);
        }

        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO reminder_deliveries
             (id, reminder_id, scheduled_for, delivered_at, call_id,
              attempt_count, status, user_response)
             VALUES (?1,?2,?3,?4,?5,1,'delivered',NULL)",
            rusqlite::params![
                id,
                reminder_id,
                scheduled_for.to_rfc3339(),
                now.to_rfc3339(),
                call_id
            ],
        )?;
        info!(delivery_id = %id, reminder_id, "delivery attempt recorded");
        self.get_locked(&conn, &id)
    }

    /// Re-fire a `retry_pending` record: back to `delivered`, attempt count
    /// incremented, bound to the new call.
    pub fn record_retry(&self, delivery_id: &str, call_id: &str) -> Result<DeliveryRecord> {
        let conn = self.conn.lock().unwrap();
        let record = self.get_locked(&conn, delivery_id)?;
        self.check(&record, DeliveryStatus::Delivered)?;
        conn.execute(
            "UPDATE reminder_deliveries
             SET status = 'delivered', delivered_at = ?1, call_id = ?2,
                 attempt_count = attempt_count + 1
             WHERE id = ?3",
            rusqlite::params![Utc::now().to_rfc3339(), call_id, delivery_id],
        )?;
        info!(delivery_id, "delivery retried");
        self.get_locked(&conn, delivery_id)
    }

    /// Apply one legal transition, optionally with the senior's response.
    pub fn transition(
        &self,
        delivery_id: &str,
        to: DeliveryStatus,
        user_response: Option<&str>,
    ) -> Result<DeliveryRecord> {
        let conn = self.conn.lock().unwrap();
        let record = self.get_locked(&conn, delivery_id)?;
        self.check(&record, to)?;
        conn.execute(
            "UPDATE reminder_deliveries
             SET status = ?1,
                 user_response = COALESCE(?2, user_response)
             WHERE id = ?3",
            rusqlite::params![to.to_string(), user_response, delivery_id],
        )?;
        info!(delivery_id, from = %record.status, to = %to, "delivery transition");
        self.get_locked(&conn, delivery_id)
    }

    pub fn get(&self, delivery_id: &str) -> Result<DeliveryRecord> {
        let conn = self.conn.lock().unwrap();
        self.get_locked(&conn, delivery_id)
    }

    /// Non-terminal record for an instance, if any.
    pub fn open_for_instance(
        &self,
        reminder_id: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<DeliveryRecord>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT id, reminder_id, scheduled_for, delivered_at, call_id,
                    attempt_count, status, user_response
             FROM reminder_deliveries
             WHERE reminder_id = ?1 AND scheduled_for = ?2",
            rusqlite::params![reminder_id, scheduled_for.to_rfc3339()],
            row_to_delivery,
        ) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Records sitting in `retry_pending` whose last attempt is older than
    /// `min_age` — the retry poll set.
    pub fn retryable(&self, min_age: chrono::Duration) -> Result<Vec<DeliveryRecord>> {
        let cutoff = (Utc::now() - min_age).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, reminder_id, scheduled_for, delivered_at, call_id,
                    attempt_count, status, user_response
             FROM reminder_deliveries
             WHERE status = 'retry_pending' AND delivered_at < ?1",
        )?;
        let rows = stmt.query_map([cutoff], row_to_delivery)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn check(&self, record: &DeliveryRecord, to: DeliveryStatus) -> Result<()> {
        if !record.status.can_transition(to) {
            return Err(SchedulerError::IllegalTransition {
                from: record.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    fn get_locked(&self, conn: &Connection, delivery_id: &str) -> Result<DeliveryRecord> {
        conn.query_row(
            "SELECT id, reminder_id, scheduled_for, delivered_at, call_id,
                    attempt_count, status, user_response
             FROM reminder_deliveries WHERE id = ?1",
            [delivery_id],
            row_to_delivery,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => SchedulerError::DeliveryNotFound {
                id: delivery_id.to_string(),
            },
            other => SchedulerError::Database(other),
        })
    }
}

fn row_to_delivery(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeliveryRecord> {
    let scheduled: String = row.get(2)?;
    let delivered: Option<String> = row.get(3)?;
    let status_str: String = row.get(6)?;
    Ok(DeliveryRecord {
        id: row.get(0)?,
        reminder_id: row.get(1)?,
        scheduled_for: DateTime::parse_from_rfc3339(&scheduled)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
        delivered_at: delivered.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        }),
        call_id: row.get(4)?,
        attempt_count: row.get::<_, i64>(5)? as u32,
        status: status_str.parse().unwrap_or(DeliveryStatus::Delivered),
        user_response: row.get(7)?,
    })
}
