use std::sync::Mutex;

use rusqlite::Connection;

use donna_core::types::SeniorId;

use crate::db::init_db;
use crate::error::{Result, SeniorError};
use crate::types::SeniorProfile;

/// Thread-safe read access to senior profiles.
pub struct SeniorStore {
    db: Mutex<Connection>,
}

impl SeniorStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn get(&self, id: &SeniorId) -> Result<SeniorProfile> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, first_name, phone, timezone, interests, medical_notes, family, is_active
             FROM seniors WHERE id = ?1",
            rusqlite::params![id.as_str()],
            row_to_profile,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => SeniorError::NotFound {
                id: id.to_string(),
            },
            other => SeniorError::Database(other),
        })
    }

    /// Look up by the last ten digits of a phone number — the manual-call
    /// prefetch key.
    pub fn get_by_phone(&self, normalized_phone: &str) -> Result<Option<SeniorProfile>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, first_name, phone, timezone, interests, medical_notes, family, is_active
             FROM seniors WHERE is_active = 1",
        )?;
        let rows = stmt.query_map([], row_to_profile)?;
        for profile in rows.flatten() {
            let digits: String = profile.phone.chars().filter(|c| c.is_ascii_digit()).collect();
            let tail = if digits.len() > 10 {
                &digits[digits.len() - 10..]
            } else {
                &digits
            };
            if tail == normalized_phone {
                return Ok(Some(profile));
            }
        }
        Ok(None)
    }

    /// Seed or update a profile. Used by tests and fresh-database bootstrap.
    pub fn upsert(&self, profile: &SeniorProfile) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let interests = serde_json::to_string(&profile.interests).unwrap_or_else(|_| "[]".into());
        db.execute(
            "INSERT INTO seniors
             (id, first_name, phone, timezone, interests, medical_notes, family, is_active,
              created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?9)
             ON CONFLICT(id) DO UPDATE SET
               first_name = excluded.first_name,
               phone = excluded.phone,
               timezone = excluded.timezone,
               interests = excluded.interests,
               medical_notes = excluded.medical_notes,
               family = excluded.family,
               is_active = excluded.is_active,
               updated_at = excluded.updated_at",
            rusqlite::params![
                profile.id.as_str(),
                profile.first_name,
                profile.phone,
                profile.timezone,
                interests,
                profile.medical_notes,
                profile.family,
                profile.is_active as i64,
                now,
            ],
        )?;
        Ok(())
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<SeniorProfile> {
    let interests_json: String = row.get(4)?;
    Ok(SeniorProfile {
        id: SeniorId::from(row.get::<_, String>(0)?),
        first_name: row.get(1)?,
        phone: row.get(2)?,
        timezone: row.get(3)?,
        interests: serde_json::from_str(&interests_json).unwrap_or_default(),
        medical_notes: row.get(5)?,
        family: row.get(6)?,
        is_active: row.get::<_, i64>(7)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SeniorStore {
        SeniorStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn margaret() -> SeniorProfile {
        SeniorProfile {
            id: SeniorId::from("s-1"),
            first_name: "Margaret".into(),
            phone: "+15551234567".into(),
            timezone: "America/Denver".into(),
            interests: vec!["gardening".into(), "quilting".into()],
            medical_notes: Some("mild arthritis".into()),
            family: Some("son Tom in Denver".into()),
            is_active: true,
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = store();
        store.upsert(&margaret()).unwrap();
        let p = store.get(&SeniorId::from("s-1")).unwrap();
        assert_eq!(p.first_name, "Margaret");
        assert_eq!(p.interests, vec!["gardening", "quilting"]);
        assert!(p.is_active);
    }

    #[test]
    fn missing_senior_is_not_found() {
        let store = store();
        match store.get(&SeniorId::from("nope")) {
            Err(SeniorError::NotFound { id }) => assert_eq!(id, "nope"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn phone_lookup_matches_last_ten_digits() {
        let store = store();
        store.upsert(&margaret()).unwrap();
        let found = store.get_by_phone("5551234567").unwrap();
        assert!(found.is_some());
        assert!(store.get_by_phone("5550000000").unwrap().is_none());
    }
}
