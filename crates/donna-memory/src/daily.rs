use std::collections::BTreeSet;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;
use tracing::debug;

use crate::db::init_db;
use crate::error::Result;

/// What one completed call contributes to the day's record.
#[derive(Debug, Clone, Default)]
pub struct CallContribution {
    pub topics: Vec<String>,
    pub reminders_delivered: Vec<String>,
    pub advice: Vec<String>,
    pub key_moments: Vec<String>,
    pub summary: Option<String>,
}

/// Aggregated view of everything said to a senior so far today.
#[derive(Debug, Clone, Default)]
pub struct DailyContext {
    pub topics: Vec<String>,
    pub reminders_delivered: Vec<String>,
    pub advice: Vec<String>,
    pub key_moments: Vec<String>,
    pub summaries: Vec<String>,
    pub previous_call_count: u32,
}

impl DailyContext {
    pub fn is_empty(&self) -> bool {
        self.previous_call_count == 0
    }

    /// Render the "earlier today" injection block for the system prompt.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = format!(
            "You have already spoken {} time{} today.\n",
            self.previous_call_count,
            if self.previous_call_count == 1 { "" } else { "s" }
        );
        if !self.topics.is_empty() {
            out.push_str(&format!("Topics covered: {}.\n", self.topics.join(", ")));
        }
        if !self.reminders_delivered.is_empty() {
            out.push_str(&format!(
                "Reminders already delivered today (ask how they went instead of repeating them): {}.\n",
                self.reminders_delivered.join(", ")
            ));
        }
        if !self.advice.is_empty() {
            out.push_str(&format!("Advice already given: {}.\n", self.advice.join("; ")));
        }
        if let Some(last) = self.summaries.last() {
            out.push_str(&format!("Last call summary: {last}\n"));
        }
        out
    }
}

/// One row per (senior, local calendar day), accumulated across calls.
pub struct DailyContextStore {
    db: Mutex<Connection>,
}

impl DailyContextStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// The senior's current local calendar day.
    pub fn local_today(tz: Tz) -> NaiveDate {
        Utc::now().with_timezone(&tz).date_naive()
    }

    /// Fold one completed call into the day's record.
    pub fn append(
        &self,
        senior_id: &str,
        date: NaiveDate,
        contribution: &CallContribution,
    ) -> Result<()> {
        let mut current = self.get(senior_id, date)?;

        merge(&mut current.topics, &contribution.topics);
        merge(&mut current.reminders_delivered, &contribution.reminders_delivered);
        merge(&mut current.advice, &contribution.advice);
        merge(&mut current.key_moments, &contribution.key_moments);
        if let Some(summary) = &contribution.summary {
            current.summaries.push(summary.clone());
        }
        current.previous_call_count += 1;

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO daily_call_context
             (senior_id, local_date, topics, reminders, advice, key_moments, summaries,
              call_count, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
             ON CONFLICT(senior_id, local_date) DO UPDATE SET
               topics = excluded.topics,
               reminders = excluded.reminders,
               advice = excluded.advice,
               key_moments = excluded.key_moments,
               summaries = excluded.summaries,
               call_count = excluded.call_count,
               updated_at = excluded.updated_at",
            rusqlite::params![
                senior_id,
                date.to_string(),
                serde_json::to_string(&current.topics)?,
                serde_json::to_string(&current.reminders_delivered)?,
                serde_json::to_string(&current.advice)?,
                serde_json::to_string(&current.key_moments)?,
                serde_json::to_string(&current.summaries)?,
                current.previous_call_count,
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!(senior_id, %date, calls = current.previous_call_count, "daily context updated");
        Ok(())
    }

    /// The aggregate for a day; empty default when no call has happened yet.
    pub fn get(&self, senior_id: &str, date: NaiveDate) -> Result<DailyContext> {
        let db = self.db.lock().unwrap();
        let row = db.query_row(
            "SELECT topics, reminders, advice, key_moments, summaries, call_count
             FROM daily_call_context WHERE senior_id = ?1 AND local_date = ?2",
            rusqlite::params![senior_id, date.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        );

        match row {
            Ok((topics, reminders, advice, key_moments, summaries, count)) => Ok(DailyContext {
                topics: serde_json::from_str(&topics).unwrap_or_default(),
                reminders_delivered: serde_json::from_str(&reminders).unwrap_or_default(),
                advice: serde_json::from_str(&advice).unwrap_or_default(),
                key_moments: serde_json::from_str(&key_moments).unwrap_or_default(),
                summaries: serde_json::from_str(&summaries).unwrap_or_default(),
                previous_call_count: count as u32,
            }),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(DailyContext::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reminder titles already delivered to this senior today — used by the
    /// scheduler to soften later same-day deliveries.
    pub fn delivered_today(&self, senior_id: &str, date: NaiveDate) -> Result<Vec<String>> {
        Ok(self.get(senior_id, date)?.reminders_delivered)
    }
}

/// Append new entries, dropping duplicates while preserving first-seen order.
fn merge(into: &mut Vec<String>, new: &[String]) {
    let seen: BTreeSet<String> = into.iter().cloned().collect();
    for entry in new {
        if !seen.contains(entry) && !entry.is_empty() {
            into.push(entry.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DailyContextStore {
        DailyContextStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 30).unwrap()
    }

    #[test]
    fn calls_accumulate_and_deduplicate() {
        let store = store();
        store
            .append(
                "s-1",
                date(),
                &CallContribution {
                    topics: vec!["gardening".into(), "weather".into()],
                    reminders_delivered: vec!["morning pill".into()],
                    summary: Some("pleasant morning chat".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .append(
                "s-1",
                date(),
                &CallContribution {
                    topics: vec!["weather".into(), "her son".into()],
                    reminders_delivered: vec!["morning pill".into()],
                    summary: Some("short afternoon call".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let ctx = store.get("s-1", date()).unwrap();
        assert_eq!(ctx.previous_call_count, 2);
        assert_eq!(ctx.topics, vec!["gardening", "weather", "her son"]);
        assert_eq!(ctx.reminders_delivered, vec!["morning pill"]);
        assert_eq!(ctx.summaries.len(), 2);
    }

    #[test]
    fn days_are_isolated() {
        let store = store();
        store
            .append(
                "s-1",
                date(),
                &CallContribution {
                    topics: vec!["gardening".into()],
                    ..Default::default()
                },
            )
            .unwrap();
        let next_day = date().succ_opt().unwrap();
        assert!(store.get("s-1", next_day).unwrap().is_empty());
    }

    #[test]
    fn render_mentions_already_delivered_reminders() {
        let store = store();
        store
            .append(
                "s-1",
                date(),
                &CallContribution {
                    reminders_delivered: vec!["evening walk".into()],
                    ..Default::default()
                },
            )
            .unwrap();
        let block = store.get("s-1", date()).unwrap().render();
        assert!(block.contains("evening walk"));
        assert!(block.contains("ask how they went"));
    }

    #[test]
    fn empty_day_renders_nothing() {
        let store = store();
        assert!(store.get("s-1", date()).unwrap().render().is_empty());
    }

    #[test]
    fn delivered_today_lists_titles() {
        let store = store();
        store
            .append(
                "s-1",
                date(),
                &CallContribution {
                    reminders_delivered: vec!["morning pill".into(), "call Tom".into()],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(
            store.delivered_today("s-1", date()).unwrap(),
            vec!["morning pill", "call Tom"]
        );
    }
}
