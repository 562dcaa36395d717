use dashmap::DashMap;
use tracing::debug;

use donna_core::types::CallType;
use donna_seniors::SeniorProfile;
use donna_session::PendingReminder;

/// Everything a media-stream handshake needs, built before the outbound
/// call is even requested so the first turn starts without a database or
/// embedding round-trip.
#[derive(Debug, Clone)]
pub struct PreparedCallContext {
    pub senior: SeniorProfile,
    pub call_type: CallType,
    /// Tiered memory block, rendered.
    pub memory_block: String,
    /// "Earlier today" block, rendered.
    pub daily_block: String,
    /// Pre-formatted reminder prompt for the system prompt.
    pub reminder_block: String,
    /// Pre-generated opening line.
    pub greeting: String,
    pub pending_reminders: Vec<PendingReminder>,
}

/// Process-wide stash of prepared contexts, keyed by the provider call id
/// (scheduler-placed calls) or by normalized phone (manual calls, where the
/// call id is not known until the media stream connects). Entries are
/// one-time-consume.
#[derive(Default)]
pub struct ContextStash {
    by_call: DashMap<String, PreparedCallContext>,
    by_phone: DashMap<String, PreparedCallContext>,
}

impl ContextStash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_call(&self, call_id: &str, context: PreparedCallContext) {
        debug!(call_id, "context bound to call");
        self.by_call.insert(call_id.to_string(), context);
    }

    /// Manual-call mirror: keyed by the destination's last ten digits.
    pub fn bind_phone(&self, normalized_phone: &str, context: PreparedCallContext) {
        debug!(phone = normalized_phone, "context bound to phone");
        self.by_phone.insert(normalized_phone.to_string(), context);
    }

    /// Consume the context for a connecting call, checking the call key
    /// first and falling back to the phone mirror.
    pub fn take(&self, call_id: &str, normalized_phone: Option<&str>) -> Option<PreparedCallContext> {
        if let Some((_, ctx)) = self.by_call.remove(call_id) {
            return Some(ctx);
        }
        normalized_phone.and_then(|p| self.by_phone.remove(p).map(|(_, ctx)| ctx))
    }

    /// Post-call cleanup for contexts that never got consumed (failed dials).
    pub fn clear_call(&self, call_id: &str) {
        self.by_call.remove(call_id);
    }

    pub fn len(&self) -> usize {
        self.by_call.len() + self.by_phone.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Render the opening line for an outbound call. Template-based — the LLM
/// is not in the loop yet when this is spoken.
pub fn greeting_for(first_name: &str, call_type: CallType, local_hour: u32) -> String {
    let day_part = match local_hour {
        5..=11 => "morning",
        12..=16 => "afternoon",
        _ => "evening",
    };
    match call_type {
        CallType::Reminder => format!(
            "Good {day_part}, {first_name}! It's Donna. I'm calling with a little reminder, \
             but first — how are you doing today?"
        ),
        CallType::CheckIn | CallType::Scheduled => format!(
            "Good {day_part}, {first_name}! It's Donna, just calling to see how you're doing."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use donna_core::types::SeniorId;

    fn context() -> PreparedCallContext {
        PreparedCallContext {
            senior: SeniorProfile {
                id: SeniorId::from("s-1"),
                first_name: "Margaret".into(),
                phone: "+15551234567".into(),
                timezone: "America/Denver".into(),
                interests: vec![],
                medical_notes: None,
                family: None,
                is_active: true,
            },
            call_type: CallType::Reminder,
            memory_block: String::new(),
            daily_block: String::new(),
            reminder_block: String::new(),
            greeting: String::new(),
            pending_reminders: vec![],
        }
    }

    #[test]
    fn call_keyed_contexts_are_one_time_consume() {
        let stash = ContextStash::new();
        stash.bind_call("CA1", context());
        assert!(stash.take("CA1", None).is_some());
        assert!(stash.take("CA1", None).is_none());
    }

    #[test]
    fn phone_mirror_is_the_fallback() {
        let stash = ContextStash::new();
        stash.bind_phone("5551234567", context());
        let got = stash.take("CA-unknown", Some("5551234567"));
        assert!(got.is_some());
        assert!(stash.is_empty());
    }

    #[test]
    fn greetings_follow_time_of_day_and_call_type() {
        let g = greeting_for("Margaret", CallType::Reminder, 8);
        assert!(g.contains("Good morning, Margaret"));
        assert!(g.contains("reminder"));

        let g = greeting_for("Harold", CallType::CheckIn, 19);
        assert!(g.contains("Good evening, Harold"));
        assert!(!g.contains("reminder"));
    }
}
