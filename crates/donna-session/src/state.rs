use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use donna_core::config::MAX_TRANSCRIPT_TURNS;
use donna_core::types::{CallId, CallType, EndReason, Role, SeniorId};

/// Caps on the tracker's extraction lists. Oldest entries are evicted first.
pub const MAX_TOPICS: usize = 10;
pub const MAX_QUESTIONS: usize = 8;
pub const MAX_ADVICE: usize = 8;

/// A reminder that is eligible for delivery during this call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReminder {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Delivery record tracking this attempt, when the call was placed by
    /// the scheduler for this reminder.
    pub delivery_id: Option<String>,
}

/// One turn of the rolling transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// How the senior responded to a reminder, as classified by the quick
/// observer's acknowledgment rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckKind {
    /// "okay, I will" — heard and accepted.
    Acknowledged,
    /// "I already took it" — the task is done.
    Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderResponse {
    pub kind: AckKind,
    pub text: String,
    pub confidence: f64,
}

/// Per-turn counters, accumulated for post-call analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnMetrics {
    pub user_turns: u32,
    pub assistant_turns: u32,
    pub interruptions: u32,
    pub guidance_injections: u32,
}

/// The per-call mutable state bundle.
///
/// Mutations come from processors inside the pipeline task, plus the
/// director's background analysis task (which only appends to
/// `reminders_delivered`). A single mutex with short critical sections is
/// the whole coordination story.
#[derive(Debug)]
pub struct CallSession {
    pub call_id: CallId,
    pub senior_id: SeniorId,
    pub started_at: DateTime<Utc>,
    pub max_duration: Duration,
    pub call_type: CallType,

    pub pending_reminders: Vec<PendingReminder>,
    /// Titles spoken this call. Grows monotonically; a title in here is
    /// never spoken again.
    reminders_delivered: BTreeSet<String>,

    pub goodbye_in_progress: bool,
    pub donna_said_goodbye: bool,
    pub senior_said_goodbye: bool,
    pub call_ending_initiated: bool,
    pub termination_reason: Option<EndReason>,

    /// True while the transport is playing synthesized audio. Read by the
    /// STT processor to detect barge-in.
    pub is_speaking: bool,

    transcript: VecDeque<TranscriptTurn>,
    pub topics_discussed: Vec<String>,
    pub questions_asked: Vec<String>,
    pub advice_given: Vec<String>,

    pub reminder_response: Option<ReminderResponse>,
    pub metrics: TurnMetrics,

    /// Informational max-token recommendation from the quick observer,
    /// consumed by the response generator for the next turn.
    pub token_budget_hint: Option<u32>,
}

pub type SharedSession = Arc<Mutex<CallSession>>;

impl CallSession {
    pub fn new(
        call_id: CallId,
        senior_id: SeniorId,
        call_type: CallType,
        max_duration: Duration,
    ) -> Self {
        Self {
            call_id,
            senior_id,
            started_at: Utc::now(),
            max_duration,
            call_type,
            pending_reminders: Vec::new(),
            reminders_delivered: BTreeSet::new(),
            goodbye_in_progress: false,
            donna_said_goodbye: false,
            senior_said_goodbye: false,
            call_ending_initiated: false,
            termination_reason: None,
            is_speaking: false,
            transcript: VecDeque::with_capacity(MAX_TRANSCRIPT_TURNS),
            topics_discussed: Vec::new(),
            questions_asked: Vec::new(),
            advice_given: Vec::new(),
            reminder_response: None,
            metrics: TurnMetrics::default(),
            token_budget_hint: None,
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn minutes_elapsed(&self) -> f64 {
        let secs = Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds() as f64
            / 1_000.0;
        secs / 60.0
    }

    /// Record a reminder as delivered. Returns false if it already was —
    /// the set only ever grows.
    pub fn deliver_reminder(&mut self, title: &str) -> bool {
        self.reminders_delivered.insert(title.to_string())
    }

    pub fn is_reminder_delivered(&self, title: &str) -> bool {
        self.reminders_delivered.contains(title)
    }

    pub fn reminders_delivered(&self) -> impl Iterator<Item = &str> {
        self.reminders_delivered.iter().map(|s| s.as_str())
    }

    /// Pending reminders that have not been delivered yet this call.
    pub fn undelivered_reminders(&self) -> Vec<&PendingReminder> {
        self.pending_reminders
            .iter()
            .filter(|r| !self.reminders_delivered.contains(&r.title))
            .collect()
    }

    /// Append a turn, evicting from the head past the ring capacity.
    pub fn push_turn(&mut self, role: Role, content: impl Into<String>) {
        if self.transcript.len() == MAX_TRANSCRIPT_TURNS {
            self.transcript.pop_front();
        }
        self.transcript.push_back(TranscriptTurn {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn transcript(&self) -> impl Iterator<Item = &TranscriptTurn> {
        self.transcript.iter()
    }

    pub fn transcript_len(&self) -> usize {
        self.transcript.len()
    }

    /// Render the transcript as `Role: content` lines for AI consumption.
    pub fn transcript_text(&self) -> String {
        let mut out = String::new();
        for turn in &self.transcript {
            out.push_str(&format!("{}: {}\n", turn.role, turn.content));
        }
        out
    }

    pub fn note_topic(&mut self, topic: &str) {
        push_capped(&mut self.topics_discussed, topic, MAX_TOPICS);
    }

    pub fn note_question(&mut self, question: &str) {
        push_capped(&mut self.questions_asked, question, MAX_QUESTIONS);
    }

    pub fn note_advice(&mut self, advice: &str) {
        push_capped(&mut self.advice_given, advice, MAX_ADVICE);
    }

    pub fn record_reminder_response(&mut self, response: ReminderResponse) {
        self.reminder_response = Some(response);
    }

    /// Clear goodbye bookkeeping after a false goodbye (the senior kept
    /// talking inside the silence window).
    pub fn clear_goodbye(&mut self) {
        self.goodbye_in_progress = false;
        self.senior_said_goodbye = false;
        self.call_ending_initiated = false;
    }
}

fn push_capped(list: &mut Vec<String>, entry: &str, cap: usize) {
    if list.iter().any(|e| e == entry) {
        return;
    }
    if list.len() == cap {
        list.remove(0);
    }
    list.push(entry.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CallSession {
        CallSession::new(
            CallId::from("CA123"),
            SeniorId::from("senior-1"),
            CallType::CheckIn,
            Duration::from_secs(600),
        )
    }

    #[test]
    fn transcript_ring_caps_at_forty_turns() {
        let mut s = session();
        for i in 0..50 {
            s.push_turn(Role::User, format!("turn {i}"));
        }
        assert_eq!(s.transcript_len(), MAX_TRANSCRIPT_TURNS);
        // oldest entries dropped from the head
        assert_eq!(s.transcript().next().unwrap().content, "turn 10");
    }

    #[test]
    fn reminders_delivered_only_grows() {
        let mut s = session();
        assert!(s.deliver_reminder("blood pressure pill"));
        assert!(!s.deliver_reminder("blood pressure pill"));
        assert!(s.is_reminder_delivered("blood pressure pill"));
        assert_eq!(s.reminders_delivered().count(), 1);
    }

    #[test]
    fn undelivered_filters_delivered_titles() {
        let mut s = session();
        s.pending_reminders = vec![
            PendingReminder {
                id: "r1".into(),
                title: "morning walk".into(),
                description: String::new(),
                delivery_id: None,
            },
            PendingReminder {
                id: "r2".into(),
                title: "evening pill".into(),
                description: String::new(),
                delivery_id: None,
            },
        ];
        s.deliver_reminder("morning walk");
        let undelivered = s.undelivered_reminders();
        assert_eq!(undelivered.len(), 1);
        assert_eq!(undelivered[0].title, "evening pill");
    }

    #[test]
    fn extraction_lists_evict_fifo() {
        let mut s = session();
        for i in 0..12 {
            s.note_question(&format!("q{i}"));
        }
        assert_eq!(s.questions_asked.len(), MAX_QUESTIONS);
        assert_eq!(s.questions_asked[0], "q4");

        for i in 0..15 {
            s.note_topic(&format!("t{i}"));
        }
        assert_eq!(s.topics_discussed.len(), MAX_TOPICS);
    }

    #[test]
    fn duplicate_topics_are_not_recorded_twice() {
        let mut s = session();
        s.note_topic("gardening");
        s.note_topic("gardening");
        assert_eq!(s.topics_discussed.len(), 1);
    }

    #[test]
    fn clear_goodbye_resets_flags() {
        let mut s = session();
        s.goodbye_in_progress = true;
        s.senior_said_goodbye = true;
        s.call_ending_initiated = true;
        s.clear_goodbye();
        assert!(!s.goodbye_in_progress);
        assert!(!s.senior_said_goodbye);
        assert!(!s.call_ending_initiated);
    }
}
