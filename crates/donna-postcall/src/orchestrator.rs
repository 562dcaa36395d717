use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use donna_agent::provider::LlmProvider;
use donna_core::types::EndReason;
use donna_memory::{CallContribution, DailyContextStore, MemoryStore};
use donna_scheduler::{ContextStash, DeliveryStatus, DeliveryStore};
use donna_seniors::SeniorStore;
use donna_session::{AckKind, PendingReminder, ReminderResponse, SharedSession};

use crate::analysis::analyze_call;
use crate::extract::extract_memories;
use crate::store::ConversationStore;

/// A delivery with no acknowledgment exhausts after this many attempts.
const MAX_DELIVERY_ATTEMPTS: u32 = 2;

/// Everything the orchestrator needs from the session, cloned under one
/// short lock so the steps run without touching the mutex again.
struct CallSnapshot {
    call_id: String,
    senior_id: String,
    call_type: String,
    started_at: String,
    duration_secs: u64,
    transcript: String,
    topics: Vec<String>,
    advice: Vec<String>,
    reminders_delivered: Vec<String>,
    reminder_response: Option<ReminderResponse>,
    pending_reminders: Vec<PendingReminder>,
}

/// Sequenced post-call finalization. Runs as a detached task per call with
/// its own error boundary: a failed step is logged and the next step runs.
pub struct PostCallOrchestrator {
    conversations: Arc<ConversationStore>,
    provider: Arc<dyn LlmProvider>,
    model: String,
    memory: Arc<MemoryStore>,
    daily: Arc<DailyContextStore>,
    deliveries: Arc<DeliveryStore>,
    stash: Arc<ContextStash>,
    seniors: Arc<SeniorStore>,
}

impl PostCallOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversations: Arc<ConversationStore>,
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        memory: Arc<MemoryStore>,
        daily: Arc<DailyContextStore>,
        deliveries: Arc<DeliveryStore>,
        stash: Arc<ContextStash>,
        seniors: Arc<SeniorStore>,
    ) -> Self {
        Self {
            conversations,
            provider,
            model: model.into(),
            memory,
            daily,
            deliveries,
            stash,
            seniors,
        }
    }

    /// Run the full sequence. Never returns an error — each step logs and
    /// yields to the next.
    pub async fn run(&self, session: &SharedSession, reason: EndReason) {
        let snapshot = snapshot(session, reason);
        info!(
            call_id = %snapshot.call_id,
            senior = %snapshot.senior_id,
            %reason,
            "post-call orchestration starting"
        );

        // 1. persist the conversation
        if let Err(e) = self.conversations.record_conversation(
            &snapshot.call_id,
            &snapshot.senior_id,
            &snapshot.call_type,
            &snapshot.started_at,
            snapshot.duration_secs,
            &reason.to_string(),
            &snapshot.transcript,
        ) {
            error!(call_id = %snapshot.call_id, error = %e, "conversation persist failed");
        }

        // 2. AI call analysis (degrades internally to the default)
        let senior_name = self
            .seniors
            .get(&snapshot.senior_id.clone().into())
            .map(|p| p.first_name)
            .unwrap_or_else(|_| "the senior".to_string());
        let analysis = analyze_call(
            Arc::clone(&self.provider),
            &self.model,
            &senior_name,
            &snapshot.transcript,
        )
        .await;

        // 3. save the analysis
        if let Err(e) =
            self.conversations
                .save_analysis(&snapshot.call_id, &snapshot.senior_id, &analysis)
        {
            error!(call_id = %snapshot.call_id, error = %e, "analysis save failed");
        }

        // 4. extract memories from the transcript
        extract_memories(
            Arc::clone(&self.provider),
            &self.model,
            Arc::clone(&self.memory),
            &snapshot.senior_id,
            &snapshot.call_id,
            &snapshot.transcript,
        )
        .await;

        // 5. fold the call into today's record (senior-local day)
        let tz = self
            .seniors
            .get(&snapshot.senior_id.clone().into())
            .map(|p| p.tz())
            .unwrap_or(chrono_tz::UTC);
        let contribution = CallContribution {
            topics: merge_unique(&snapshot.topics, &analysis.topics),
            reminders_delivered: snapshot.reminders_delivered.clone(),
            advice: snapshot.advice.clone(),
            key_moments: analysis.positive_observations.clone(),
            summary: Some(analysis.summary.clone()),
        };
        if let Err(e) = self.daily.append(
            &snapshot.senior_id,
            DailyContextStore::local_today(tz),
            &contribution,
        ) {
            error!(call_id = %snapshot.call_id, error = %e, "daily context append failed");
        }

        // 6. finalize delivery records still sitting in `delivered`
        self.finalize_deliveries(&snapshot);

        // 7. clear the per-call reminder context
        self.stash.clear_call(&snapshot.call_id);

        info!(call_id = %snapshot.call_id, "post-call orchestration complete");
    }

    fn finalize_deliveries(&self, snapshot: &CallSnapshot) {
        for pending in &snapshot.pending_reminders {
            let Some(delivery_id) = &pending.delivery_id else {
                continue;
            };
            let record = match self.deliveries.get(delivery_id) {
                Ok(r) => r,
                Err(e) => {
                    error!(delivery_id, error = %e, "delivery lookup failed");
                    continue;
                }
            };
            if record.status != DeliveryStatus::Delivered {
                // already resolved during the call
                continue;
            }

            let (to, response_text) = match &snapshot.reminder_response {
                Some(resp) => (
                    match resp.kind {
                        AckKind::Confirmed => DeliveryStatus::Confirmed,
                        AckKind::Acknowledged => DeliveryStatus::Acknowledged,
                    },
                    Some(resp.text.clone()),
                ),
                None if record.attempt_count >= MAX_DELIVERY_ATTEMPTS => {
                    (DeliveryStatus::MaxAttempts, None)
                }
                None => (DeliveryStatus::RetryPending, None),
            };

            if let Err(e) = self
                .deliveries
                .transition(delivery_id, to, response_text.as_deref())
            {
                error!(delivery_id, error = %e, "delivery finalization failed");
            }
        }
    }
}

fn snapshot(session: &SharedSession, reason: EndReason) -> CallSnapshot {
    let mut s = session.lock().unwrap();
    if s.termination_reason.is_none() {
        s.termination_reason = Some(reason);
    }
    CallSnapshot {
        call_id: s.call_id.to_string(),
        senior_id: s.senior_id.to_string(),
        call_type: s.call_type.to_string(),
        started_at: s.started_at.to_rfc3339(),
        duration_secs: (Utc::now() - s.started_at).num_seconds().max(0) as u64,
        transcript: s.transcript_text(),
        topics: s.topics_discussed.clone(),
        advice: s.advice_given.clone(),
        reminders_delivered: s.reminders_delivered().map(str::to_string).collect(),
        reminder_response: s.reminder_response.clone(),
        pending_reminders: s.pending_reminders.clone(),
    }
}

fn merge_unique(a: &[String], b: &[String]) -> Vec<String> {
    let mut out: Vec<String> = a.to_vec();
    for entry in b {
        if !out.contains(entry) {
            out.push(entry.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use donna_agent::provider::{ChatRequest, ChatResponse, ProviderError};
    use donna_core::types::{CallId, CallType, Role, SeniorId};
    use donna_memory::Embedder;
    use donna_scheduler::ReminderStore;
    use donna_session::CallSession;
    use rusqlite::Connection;
    use std::time::Duration;

    struct CannedProvider;

    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            // the extraction prompt asks for an array, the analysis for an
            // object — answer accordingly
            let content = if req.system.contains("JSON array") {
                r#"[{"type": "preference", "content": "Margaret loves her rose garden", "importance": 70}]"#
            } else {
                r#"{"summary": "Warm chat about the garden.", "topics": ["gardening"], "engagement_score": 82, "call_quality": "good"}"#
            };
            Ok(ChatResponse {
                content: content.to_string(),
                model: "canned".into(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "end_turn".into(),
            })
        }
    }

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, text: &str) -> donna_memory::Result<Vec<f32>> {
            let h = text.len() as f32;
            Ok(vec![1.0, h, h * 0.5])
        }
    }

    struct Fixture {
        orchestrator: PostCallOrchestrator,
        deliveries: Arc<DeliveryStore>,
        daily: Arc<DailyContextStore>,
        conversations: Arc<ConversationStore>,
        memory: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let (reminders, deliveries) =
            ReminderStore::new(Connection::open_in_memory().unwrap()).unwrap();
        drop(reminders);
        let deliveries = Arc::new(deliveries);
        let conversations =
            Arc::new(ConversationStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let memory = Arc::new(
            MemoryStore::new(
                Connection::open_in_memory().unwrap(),
                Arc::new(UnitEmbedder),
                donna_core::config::MemoryConfig::default(),
            )
            .unwrap(),
        );
        let daily =
            Arc::new(DailyContextStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let seniors =
            Arc::new(SeniorStore::new(Connection::open_in_memory().unwrap()).unwrap());

        let orchestrator = PostCallOrchestrator::new(
            Arc::clone(&conversations),
            Arc::new(CannedProvider),
            "canned",
            Arc::clone(&memory),
            Arc::clone(&daily),
            Arc::clone(&deliveries),
            Arc::new(ContextStash::new()),
            seniors,
        );
        Fixture {
            orchestrator,
            deliveries,
            daily,
            conversations,
            memory,
        }
    }

    fn session_with_delivery(delivery_id: Option<String>) -> SharedSession {
        let mut session = CallSession::new(
            CallId::from("CA-post"),
            SeniorId::from("s-1"),
            CallType::Reminder,
            Duration::from_secs(600),
        );
        session.push_turn(Role::User, "I watered the roses today");
        session.push_turn(Role::Assistant, "That sounds lovely!");
        session.pending_reminders = vec![PendingReminder {
            id: "rem-1".into(),
            title: "morning pill".into(),
            description: "with breakfast".into(),
            delivery_id,
        }];
        session.shared()
    }

    #[tokio::test]
    async fn all_steps_run_and_unacknowledged_first_attempt_goes_to_retry() {
        let f = fixture();
        let record = f
            .deliveries
            .record_attempt("rem-1", "2026-07-30T14:30:00Z".parse().unwrap(), "CA-post")
            .unwrap();
        let session = session_with_delivery(Some(record.id.clone()));

        f.orchestrator.run(&session, EndReason::SocketClosed).await;

        // conversation + analysis persisted
        let analysis = f.conversations.analysis_for_call("CA-post").unwrap().unwrap();
        assert_eq!(analysis.engagement_score, 82);
        // memory extracted through the deduped store
        assert_eq!(f.memory.count("s-1").unwrap(), 1);
        // daily context folded in
        let today = DailyContextStore::local_today(chrono_tz::UTC);
        let ctx = f.daily.get("s-1", today).unwrap();
        assert_eq!(ctx.previous_call_count, 1);
        assert!(ctx.topics.contains(&"gardening".to_string()));
        // first unacknowledged attempt → retry_pending
        let record = f.deliveries.get(&record.id).unwrap();
        assert_eq!(record.status, DeliveryStatus::RetryPending);
    }

    #[tokio::test]
    async fn acknowledged_delivery_is_confirmed_with_the_response_text() {
        let f = fixture();
        let record = f
            .deliveries
            .record_attempt("rem-1", "2026-07-30T14:30:00Z".parse().unwrap(), "CA-post")
            .unwrap();
        let session = session_with_delivery(Some(record.id.clone()));
        session.lock().unwrap().record_reminder_response(ReminderResponse {
            kind: AckKind::Confirmed,
            text: "Yes, I already took it".into(),
            confidence: 0.95,
        });

        f.orchestrator.run(&session, EndReason::Goodbye).await;

        let record = f.deliveries.get(&record.id).unwrap();
        assert_eq!(record.status, DeliveryStatus::Confirmed);
        assert_eq!(record.user_response.as_deref(), Some("Yes, I already took it"));
    }

    #[tokio::test]
    async fn second_unacknowledged_attempt_exhausts() {
        let f = fixture();
        let record = f
            .deliveries
            .record_attempt("rem-1", "2026-07-30T14:30:00Z".parse().unwrap(), "CA-1")
            .unwrap();
        f.deliveries
            .transition(&record.id, DeliveryStatus::RetryPending, None)
            .unwrap();
        let record = f.deliveries.record_retry(&record.id, "CA-post").unwrap();
        assert_eq!(record.attempt_count, 2);

        let session = session_with_delivery(Some(record.id.clone()));
        f.orchestrator.run(&session, EndReason::SocketClosed).await;

        let record = f.deliveries.get(&record.id).unwrap();
        assert_eq!(record.status, DeliveryStatus::MaxAttempts);
    }

    #[tokio::test]
    async fn terminal_delivery_is_left_untouched() {
        let f = fixture();
        let record = f
            .deliveries
            .record_attempt("rem-1", "2026-07-30T14:30:00Z".parse().unwrap(), "CA-post")
            .unwrap();
        f.deliveries
            .transition(&record.id, DeliveryStatus::Confirmed, Some("took it"))
            .unwrap();

        let session = session_with_delivery(Some(record.id.clone()));
        f.orchestrator.run(&session, EndReason::Goodbye).await;

        let record = f.deliveries.get(&record.id).unwrap();
        assert_eq!(record.status, DeliveryStatus::Confirmed);
    }
}
