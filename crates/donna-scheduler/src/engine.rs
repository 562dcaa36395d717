use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use donna_core::types::{CallId, CallType};
use donna_memory::{DailyContextStore, MemoryStore};
use donna_seniors::{SeniorProfile, SeniorStore};
use donna_session::PendingReminder;
use donna_telephony::{normalize_phone, TwilioClient};

use crate::error::{Result, SchedulerError};
use crate::prefetch::{greeting_for, ContextStash, PreparedCallContext};
use crate::store::{DeliveryStore, ReminderStore};
use crate::types::{Recurrence, Reminder};

/// Non-recurring reminders fire when due within this horizon.
const DUE_HORIZON_MINUTES: i64 = 1;
/// Recurring reminders fire when now is within ± this window of the local
/// time-of-day.
const RECUR_WINDOW_MINUTES: i64 = 5;
/// A `retry_pending` delivery re-fires once it is at least this old.
const RETRY_AGE_MINUTES: i64 = 30;

/// Drives reminder calls: polls for due instances, prefetches per-call
/// context, places the outbound call, and writes delivery records.
pub struct SchedulerEngine {
    reminders: Arc<ReminderStore>,
    deliveries: Arc<DeliveryStore>,
    seniors: Arc<SeniorStore>,
    memory: Arc<MemoryStore>,
    daily: Arc<DailyContextStore>,
    twilio: Arc<TwilioClient>,
    stash: Arc<ContextStash>,
    public_url: String,
    poll_interval: Duration,
}

impl SchedulerEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reminders: Arc<ReminderStore>,
        deliveries: Arc<DeliveryStore>,
        seniors: Arc<SeniorStore>,
        memory: Arc<MemoryStore>,
        daily: Arc<DailyContextStore>,
        twilio: Arc<TwilioClient>,
        stash: Arc<ContextStash>,
        public_url: String,
        poll_interval: Duration,
    ) -> Self {
        Self {
            reminders,
            deliveries,
            seniors,
            memory,
            daily,
            twilio,
            stash,
            public_url,
            poll_interval,
        }
    }

    /// Main loop. Polls until `shutdown` broadcasts `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.poll_interval.as_secs(), "scheduler engine started");
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One poll: fresh due instances, then aged-out retries.
    pub async fn tick(&self) -> Result<()> {
        let now = Utc::now();

        for reminder in self.reminders.active()? {
            let profile = match self.seniors.get(&reminder.senior_id.clone().into()) {
                Ok(p) if p.is_active => p,
                Ok(_) => continue,
                Err(e) => {
                    warn!(reminder_id = %reminder.id, error = %e, "senior lookup failed");
                    continue;
                }
            };

            let Some(instance) = due_instance(&reminder.schedule, now, profile.tz()) else {
                continue;
            };
            // one delivery chain per instance: any existing record, open or
            // terminal, means this occurrence is already being handled
            if self.deliveries.open_for_instance(&reminder.id, instance)?.is_some() {
                continue;
            }

            if let Err(e) = self.fire(&reminder, &profile, instance, None).await {
                warn!(reminder_id = %reminder.id, error = %e, "reminder fire failed");
            }
        }

        for record in self
            .deliveries
            .retryable(ChronoDuration::minutes(RETRY_AGE_MINUTES))?
        {
            let Some(reminder) = self.reminder_by_id(&record.reminder_id)? else {
                debug!(delivery_id = %record.id, "reminder vanished, skipping retry");
                continue;
            };
            let profile = match self.seniors.get(&reminder.senior_id.clone().into()) {
                Ok(p) if p.is_active => p,
                _ => continue,
            };
            if let Err(e) = self
                .fire(&reminder, &profile, record.scheduled_for, Some(record.id.clone()))
                .await
            {
                warn!(delivery_id = %record.id, error = %e, "reminder retry failed");
            }
        }

        Ok(())
    }

    /// Prefetch context, place the call, write the delivery record.
    async fn fire(
        &self,
        reminder: &Reminder,
        profile: &SeniorProfile,
        instance: DateTime<Utc>,
        retry_of: Option<String>,
    ) -> Result<()> {
        info!(
            reminder_id = %reminder.id,
            senior = %profile.id,
            retry = retry_of.is_some(),
            "firing reminder"
        );

        let mut context = self
            .prepare_context(profile, CallType::Reminder, Some(&reminder.title))
            .await;

        // request the call only after the context is ready
        let webhook = format!("{}/twilio/voice/outbound", self.public_url);
        let call_id: CallId = self
            .twilio
            .create_call(&profile.phone, &webhook)
            .await
            .map_err(|e| SchedulerError::Telephony(e.to_string()))?;

        let record = match retry_of {
            None => self
                .deliveries
                .record_attempt(&reminder.id, instance, call_id.as_str())?,
            Some(delivery_id) => self.deliveries.record_retry(&delivery_id, call_id.as_str())?,
        };

        // bind the delivery to the session's pending entry so the post-call
        // finalizer knows which record this call was about
        for pending in &mut context.pending_reminders {
            if pending.id == reminder.id {
                pending.delivery_id = Some(record.id.clone());
            }
        }
        self.stash.bind_call(call_id.as_str(), context);
        Ok(())
    }

    /// Prefetch for a call the scheduler did not place — the inbound path,
    /// where the media handshake arrives with no stashed context.
    pub async fn prepare_context_for(
        &self,
        profile: &SeniorProfile,
        call_type: CallType,
    ) -> PreparedCallContext {
        self.prepare_context(profile, call_type, None).await
    }

    /// Manual-call mirror: pre-build context keyed by phone, then dial.
    pub async fn manual_call(&self, profile: &SeniorProfile) -> Result<CallId> {
        let context = self.prepare_context(profile, CallType::CheckIn, None).await;
        self.stash
            .bind_phone(&normalize_phone(&profile.phone), context);

        let webhook = format!("{}/twilio/voice/outbound", self.public_url);
        self.twilio
            .create_call(&profile.phone, &webhook)
            .await
            .map_err(|e| SchedulerError::Telephony(e.to_string()))
    }

    /// Build the prepared context. Degrades piecewise: a memory or daily
    /// outage yields empty blocks, never a failed call.
    async fn prepare_context(
        &self,
        profile: &SeniorProfile,
        call_type: CallType,
        fired_title: Option<&str>,
    ) -> PreparedCallContext {
        let senior_id = profile.id.as_str();
        let tz = profile.tz();
        let today = DailyContextStore::local_today(tz);

        let memory_block = match self.memory.tiered_context(senior_id, None).await {
            Ok(block) => block,
            Err(e) => {
                warn!(senior = senior_id, error = %e, "tiered context unavailable");
                String::new()
            }
        };

        let (daily_block, delivered_today) = match self.daily.get(senior_id, today) {
            Ok(ctx) => (ctx.render(), ctx.reminders_delivered.clone()),
            Err(e) => {
                warn!(senior = senior_id, error = %e, "daily context unavailable");
                (String::new(), Vec::new())
            }
        };

        let pending = self
            .reminders
            .active_for_senior(senior_id)
            .unwrap_or_default();
        let reminder_block = render_reminder_block(&pending, fired_title, &delivered_today);
        let pending_reminders: Vec<PendingReminder> = pending
            .iter()
            .map(|r| PendingReminder {
                id: r.id.clone(),
                title: r.title.clone(),
                description: r.description.clone(),
                delivery_id: None,
            })
            .collect();

        let local_hour = Utc::now().with_timezone(&tz).hour();
        PreparedCallContext {
            senior: profile.clone(),
            call_type,
            memory_block,
            daily_block,
            reminder_block,
            greeting: greeting_for(&profile.first_name, call_type, local_hour),
            pending_reminders,
        }
    }

    fn reminder_by_id(&self, id: &str) -> Result<Option<Reminder>> {
        Ok(self.reminders.active()?.into_iter().find(|r| r.id == id))
    }
}

/// Render the reminder prompt block. A reminder already delivered earlier
/// today is softened from "deliver" to "ask whether they did it".
fn render_reminder_block(
    pending: &[Reminder],
    fired_title: Option<&str>,
    delivered_today: &[String],
) -> String {
    let mut out = String::new();
    for reminder in pending {
        let already_today = delivered_today.iter().any(|t| t == &reminder.title);
        let line = if already_today {
            format!(
                "- {}: already delivered earlier today — ask whether they did it, don't repeat it\n",
                reminder.title
            )
        } else if Some(reminder.title.as_str()) == fired_title {
            format!(
                "- {}: {} (this call is for this reminder — work it in naturally)\n",
                reminder.title, reminder.description
            )
        } else {
            format!("- {}: {}\n", reminder.title, reminder.description)
        };
        out.push_str(&line);
    }
    out
}

/// Compute the due instance for a schedule at `now`, if any.
///
/// Non-recurring: due when `at ≤ now + 1 min`. Recurring: due when the
/// local time-of-day is within ±5 min of the schedule; the instance is
/// identified by today's local date at that time.
pub fn due_instance(schedule: &Recurrence, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    match schedule {
        Recurrence::Once { at } => {
            if *at <= now + ChronoDuration::minutes(DUE_HORIZON_MINUTES) {
                Some(*at)
            } else {
                None
            }
        }
        Recurrence::Daily { hour, minute } => instance_today(now, tz, *hour, *minute),
        Recurrence::Weekly { day, hour, minute } => {
            let local = now.with_timezone(&tz);
            if local.weekday().num_days_from_monday() != (*day as u32) {
                return None;
            }
            instance_today(now, tz, *hour, *minute)
        }
    }
}

fn instance_today(now: DateTime<Utc>, tz: Tz, hour: u8, minute: u8) -> Option<DateTime<Utc>> {
    let local_now = now.with_timezone(&tz);
    let candidate = tz
        .with_ymd_and_hms(
            local_now.year(),
            local_now.month(),
            local_now.day(),
            hour as u32,
            minute as u32,
            0,
        )
        .single()?;
    let candidate_utc = candidate.with_timezone(&Utc);
    let delta = (now - candidate_utc).num_minutes().abs();
    if delta <= RECUR_WINDOW_MINUTES {
        Some(candidate_utc)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Denver;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn one_shot_is_due_within_one_minute_horizon() {
        let schedule = Recurrence::Once {
            at: at("2026-07-30T14:30:00Z"),
        };
        // 90 seconds early: not yet
        assert!(due_instance(&schedule, at("2026-07-30T14:28:30Z"), Denver).is_none());
        // 30 seconds early: inside the horizon
        assert_eq!(
            due_instance(&schedule, at("2026-07-30T14:29:30Z"), Denver),
            Some(at("2026-07-30T14:30:00Z"))
        );
        // long past: still reported; the delivery record gate stops refires
        assert!(due_instance(&schedule, at("2026-07-30T18:00:00Z"), Denver).is_some());
    }

    #[test]
    fn daily_fires_within_five_minutes_of_local_time() {
        // 08:30 Denver = 14:30 UTC in July (MDT, UTC-6)
        let schedule = Recurrence::Daily { hour: 8, minute: 30 };
        assert!(due_instance(&schedule, at("2026-07-30T14:33:00Z"), Denver).is_some());
        assert!(due_instance(&schedule, at("2026-07-30T14:26:00Z"), Denver).is_some());
        assert!(due_instance(&schedule, at("2026-07-30T14:40:00Z"), Denver).is_none());
        assert!(due_instance(&schedule, at("2026-07-30T02:00:00Z"), Denver).is_none());
    }

    #[test]
    fn daily_instance_identity_is_per_local_day() {
        let schedule = Recurrence::Daily { hour: 8, minute: 30 };
        let today = due_instance(&schedule, at("2026-07-30T14:30:00Z"), Denver).unwrap();
        let tomorrow = due_instance(&schedule, at("2026-07-31T14:30:00Z"), Denver).unwrap();
        assert_ne!(today, tomorrow);
        assert_eq!(tomorrow - today, ChronoDuration::days(1));
    }

    #[test]
    fn weekly_only_fires_on_its_weekday() {
        // 2026-07-30 is a Thursday (day 3)
        let schedule = Recurrence::Weekly { day: 3, hour: 8, minute: 30 };
        assert!(due_instance(&schedule, at("2026-07-30T14:30:00Z"), Denver).is_some());
        let wrong_day = Recurrence::Weekly { day: 4, hour: 8, minute: 30 };
        assert!(due_instance(&wrong_day, at("2026-07-30T14:30:00Z"), Denver).is_none());
    }

    #[test]
    fn reminder_block_softens_already_delivered_titles() {
        let pending = vec![Reminder {
            id: "rem-1".into(),
            senior_id: "s-1".into(),
            reminder_type: crate::types::ReminderType::Medication,
            title: "morning pill".into(),
            description: "one with breakfast".into(),
            schedule: Recurrence::Daily { hour: 8, minute: 30 },
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        }];

        let fresh = render_reminder_block(&pending, Some("morning pill"), &[]);
        assert!(fresh.contains("work it in naturally"));

        let softened =
            render_reminder_block(&pending, Some("morning pill"), &["morning pill".to_string()]);
        assert!(softened.contains("ask whether they did it"));
        assert!(!softened.contains("work it in naturally"));
    }
}
