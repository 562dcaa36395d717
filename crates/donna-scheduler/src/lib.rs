//! `donna-scheduler` — time-driven reminder calls and delivery tracking.
//!
//! # Overview
//!
//! Reminders are persisted to SQLite. The [`engine::SchedulerEngine`] polls
//! at a bounded interval and, for every due reminder instance, pre-builds
//! the per-call context (profile, tiered memories, reminder prompt,
//! greeting), requests the outbound call, and writes a delivery record. The
//! delivery record is a small state machine:
//!
//! `delivered → {acknowledged, confirmed, retry_pending, max_attempts}`,
//! `retry_pending → delivered (next attempt) | max_attempts`.
//!
//! Terminal states never transition again.

pub mod db;
pub mod engine;
pub mod error;
pub mod prefetch;
pub mod store;
pub mod types;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use prefetch::{greeting_for, ContextStash, PreparedCallContext};
pub use store::{DeliveryStore, ReminderStore};
pub use types::{DeliveryRecord, DeliveryStatus, Recurrence, Reminder, ReminderType};
