use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use donna_agent::provider::{ChatRequest, LlmProvider};
use donna_agent::repair::parse_json_lenient;
use donna_core::types::{ChatMessage, EndReason};
use donna_pipeline::{Direction, Frame, PipelineError, PipelineHandle, Processor, ProcessorContext};
use donna_session::SharedSession;

use crate::format::compact_guidance;
use crate::schema::{CallPhase, DirectorResult};

/// Per-request deadline for the analysis call.
const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(3);

/// Hard ceiling: any turn past this schedules an end in 3 s.
const HARD_LIMIT_MINUTES: f64 = 12.0;
/// Advisory: past this the cached guidance is forced to winding-down.
const WINDING_DOWN_MINUTES: f64 = 9.0;
/// Closing-phase close-out: cached closing past this schedules an end in 5 s.
const CLOSING_MINUTES: f64 = 8.0;

const HARD_LIMIT_GRACE: Duration = Duration::from_secs(3);
const CLOSING_GRACE: Duration = Duration::from_secs(5);

/// Call-scoped inputs the analysis prompt needs, snapshotted at call start
/// by the scheduler's prefetch (profile summary, top-k memories, today's
/// earlier calls).
#[derive(Debug, Clone, Default)]
pub struct DirectorContext {
    pub senior_name: String,
    pub profile_summary: String,
    pub memories_block: String,
    pub daily_block: String,
}

/// Layer 2 of the guidance stack ("director").
///
/// Per final transcript, in order and without blocking: inject the previous
/// turn's cached guidance, apply time-based fallbacks, then dispatch a fresh
/// analysis as a detached supervised task. The dispatched analysis writes
/// only the cache and the reminders-delivered set.
pub struct DirectorProcessor {
    session: SharedSession,
    handle: PipelineHandle,
    provider: Arc<dyn LlmProvider>,
    model: String,
    context: DirectorContext,
    cache: Arc<Mutex<Option<DirectorResult>>>,
    force_winding_down: bool,
    hard_end_scheduled: bool,
    closing_end_scheduled: bool,
}

impl DirectorProcessor {
    pub fn new(
        session: SharedSession,
        handle: PipelineHandle,
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        context: DirectorContext,
    ) -> Self {
        Self {
            session,
            handle,
            provider,
            model: model.into(),
            context,
            cache: Arc::new(Mutex::new(None)),
            force_winding_down: false,
            hard_end_scheduled: false,
            closing_end_scheduled: false,
        }
    }

    /// Test/introspection access to the cached result.
    pub fn cache(&self) -> Arc<Mutex<Option<DirectorResult>>> {
        Arc::clone(&self.cache)
    }

    fn on_turn(&mut self, ctx: &mut ProcessorContext) {
        self.inject_cached(ctx);
        self.apply_time_fallbacks();
        self.dispatch_analysis();
    }

    /// Step 1 — the previous turn's analysis steers this turn.
    fn inject_cached(&self, ctx: &mut ProcessorContext) {
        if self.session.lock().unwrap().goodbye_in_progress {
            return;
        }
        let cache = self.cache.lock().unwrap();
        let Some(result) = cache.as_ref() else {
            return;
        };
        if let Some(line) = compact_guidance(result, self.force_winding_down) {
            debug!(guidance = %line, "director guidance");
            ctx.emit(Frame::MessagesAppend {
                messages: vec![ChatMessage::user(format!("[DIRECTOR] {line}"))],
                run_llm: false,
            });
        }
    }

    /// Step 2 — clocks outrank analysis.
    fn apply_time_fallbacks(&mut self) {
        let minutes = self.session.lock().unwrap().minutes_elapsed();

        if minutes >= HARD_LIMIT_MINUTES && !self.hard_end_scheduled {
            self.hard_end_scheduled = true;
            let mut session = self.session.lock().unwrap();
            info!(call_id = %session.call_id, minutes, "hard limit reached, scheduling end");
            session.call_ending_initiated = true;
            session.termination_reason = Some(EndReason::HardLimit);
            drop(session);
            self.handle
                .schedule_end(HARD_LIMIT_GRACE, EndReason::HardLimit, false);
            return;
        }

        if minutes >= WINDING_DOWN_MINUTES {
            self.force_winding_down = true;
        }

        let closing = self
            .cache
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.analysis.call_phase == CallPhase::Closing)
            .unwrap_or(false);
        if closing && minutes > CLOSING_MINUTES && !self.closing_end_scheduled {
            self.closing_end_scheduled = true;
            info!(minutes, "closing phase past the threshold, scheduling end");
            // cancellable: renewed conversation withdraws the close-out
            self.handle
                .schedule_end(CLOSING_GRACE, EndReason::DirectorClose, true);
        }
    }

    /// Step 3 — fire the next analysis; its result shapes the next turn.
    fn dispatch_analysis(&self) {
        let provider = Arc::clone(&self.provider);
        let session = Arc::clone(&self.session);
        let cache = Arc::clone(&self.cache);
        let model = self.model.clone();
        let prompt = build_analysis_prompt(&self.session, &self.context);

        tokio::spawn(async move {
            let mut req = ChatRequest::new(model, ANALYSIS_SYSTEM);
            req.messages = vec![ChatMessage::user(prompt)];
            req.max_tokens = 500;
            req.temperature = 0.2;

            let response =
                match tokio::time::timeout(ANALYSIS_TIMEOUT, provider.send(&req)).await {
                    Ok(Ok(resp)) => resp,
                    Ok(Err(e)) => {
                        warn!(error = %e, "director analysis failed, cache untouched");
                        return;
                    }
                    Err(_) => {
                        warn!("director analysis timed out, cache untouched");
                        return;
                    }
                };

            let Some(value) = parse_json_lenient(&response.content) else {
                warn!("director analysis unparseable after repair, cache untouched");
                return;
            };
            let Some(result) = DirectorResult::from_json(value) else {
                warn!("director analysis not an object, cache untouched");
                return;
            };

            apply_result(&session, &cache, result);
        });
    }
}

/// Commit a completed analysis: cache it and record any reminder it decided
/// to deliver, so the very next prompt build sees the title even when the
/// spoken delivery paraphrases it.
fn apply_result(
    session: &SharedSession,
    cache: &Arc<Mutex<Option<DirectorResult>>>,
    result: DirectorResult,
) {
    if result.reminder.should_deliver {
        if let Some(which) = result.reminder.which_reminder.clone() {
            let mut s = session.lock().unwrap();
            if s.deliver_reminder(&which) {
                info!(call_id = %s.call_id, reminder = %which, "director marked reminder delivered");
            }
        }
    }
    *cache.lock().unwrap() = Some(result);
}

const ANALYSIS_SYSTEM: &str = "You are a conversation director observing a phone call between \
Donna, a voice companion, and an elderly person. Analyze the state of the conversation and \
respond with ONLY a JSON object, no prose, matching exactly this schema:\n\
{\"analysis\": {\"call_phase\": \"opening|rapport|main|winding_down|closing\", \
\"engagement_level\": \"high|medium|low\", \"current_topic\": \"string or null\", \
\"emotional_tone\": \"positive|neutral|concerned|sad\"}, \
\"direction\": {\"stay_or_shift\": \"stay|transition|wrap_up\", \"next_topic\": \"string or null\", \
\"pacing_note\": \"good|too_fast|dragging|time_to_close\"}, \
\"reminder\": {\"should_deliver\": false, \"which_reminder\": \"exact reminder title or null\", \
\"delivery_approach\": \"string or null\"}, \
\"guidance\": {\"tone\": \"string\", \"priority_action\": \"string\", \
\"specific_instruction\": \"string\"}, \
\"model_recommendation\": null}";

fn build_analysis_prompt(session: &SharedSession, context: &DirectorContext) -> String {
    let s = session.lock().unwrap();
    let minutes = s.minutes_elapsed();

    let pending: Vec<String> = s
        .undelivered_reminders()
        .iter()
        .map(|r| format!("- {}", r.title))
        .collect();
    let delivered: Vec<String> = s.reminders_delivered().map(|t| format!("- {t}")).collect();

    let mut prompt = format!(
        "Senior: {}\n{}\nMinutes elapsed: {minutes:.1}\n",
        context.senior_name, context.profile_summary
    );
    if !context.daily_block.is_empty() {
        prompt.push_str(&format!("Earlier today:\n{}\n", context.daily_block));
    }
    if !context.memories_block.is_empty() {
        prompt.push_str(&format!("Known about them:\n{}\n", context.memories_block));
    }
    if pending.is_empty() {
        prompt.push_str("Pending reminders: none\n");
    } else {
        prompt.push_str(&format!("Pending reminders:\n{}\n", pending.join("\n")));
    }
    if !delivered.is_empty() {
        prompt.push_str(&format!(
            "Already delivered this call:\n{}\n",
            delivered.join("\n")
        ));
    }
    prompt.push_str("\nTranscript:\n");
    prompt.push_str(&s.transcript_text());
    prompt
}

#[async_trait]
impl Processor for DirectorProcessor {
    fn name(&self) -> &'static str {
        "director"
    }

    async fn process(
        &mut self,
        frame: Frame,
        direction: Direction,
        ctx: &mut ProcessorContext,
    ) -> Result<(), PipelineError> {
        if let Frame::Transcription {
            is_final: true,
            text,
        } = &frame
        {
            if direction == Direction::Downstream && !text.trim().is_empty() {
                self.on_turn(ctx);
            }
        }
        ctx.forward(frame, direction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;
    use chrono::Duration as ChronoDuration;
    use donna_agent::provider::{ChatResponse, ProviderError};
    use donna_core::types::{CallId, CallType, SeniorId};
    use donna_pipeline::Pipeline;
    use donna_session::CallSession;
    use tokio::sync::mpsc;

    struct StaticProvider {
        body: String,
    }

    #[async_trait]
    impl LlmProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: self.body.clone(),
                model: "static".into(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "end_turn".into(),
            })
        }

        async fn send_stream(
            &self,
            _req: &ChatRequest,
            _tx: mpsc::Sender<donna_agent::StreamEvent>,
        ) -> Result<(), ProviderError> {
            unreachable!("director never streams")
        }
    }

    fn fixture(body: &str) -> (SharedSession, DirectorProcessor, Pipeline) {
        let session = CallSession::new(
            CallId::from("CA-dir"),
            SeniorId::from("senior-1"),
            CallType::CheckIn,
            Duration::from_secs(600),
        )
        .shared();
        let pipeline = Pipeline::new("CA-dir", None);
        let director = DirectorProcessor::new(
            session.clone(),
            pipeline.handle(),
            Arc::new(StaticProvider {
                body: body.to_string(),
            }),
            "static",
            DirectorContext {
                senior_name: "Margaret".into(),
                ..Default::default()
            },
        );
        (session, director, pipeline)
    }

    async fn turn(director: &mut DirectorProcessor, text: &str) -> ProcessorContext {
        let mut ctx = ProcessorContext::default();
        director
            .process(
                Frame::Transcription {
                    text: text.into(),
                    is_final: true,
                },
                Direction::Downstream,
                &mut ctx,
            )
            .await
            .unwrap();
        ctx
    }

    fn director_appends(ctx: &ProcessorContext) -> Vec<String> {
        ctx.out
            .iter()
            .filter_map(|(f, _)| match f {
                Frame::MessagesAppend { messages, run_llm } => {
                    assert!(!run_llm);
                    Some(messages[0].content.clone())
                }
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn analysis_from_turn_n_shapes_turn_n_plus_one() {
        let body = r#"{"analysis": {"engagement_level": "low"}}"#;
        let (_session, mut director, _pipeline) = fixture(body);

        // turn N: nothing cached yet, no injection
        let ctx = turn(&mut director, "fine I guess").await;
        assert!(director_appends(&ctx).is_empty());

        // let the dispatched analysis land
        tokio::time::sleep(Duration::from_millis(50)).await;

        // turn N+1: the cached result is injected
        let ctx = turn(&mut director, "yeah").await;
        let appends = director_appends(&ctx);
        assert_eq!(appends.len(), 1);
        assert!(appends[0].starts_with("[DIRECTOR]"));
        assert!(appends[0].contains("RE-ENGAGE"));
    }

    #[tokio::test]
    async fn malformed_analysis_leaves_cache_untouched() {
        let (_session, mut director, _pipeline) = fixture("utter nonsense, not json");
        let cache = director.cache();

        turn(&mut director, "hello").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn repairable_analysis_is_accepted() {
        // trailing comma + missing closers, as models under deadline produce
        let body = r#"{"analysis": {"call_phase": "main", "engagement_level": "high",}"#;
        let (_session, mut director, _pipeline) = fixture(body);
        let cache = director.cache();

        turn(&mut director, "hello").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let cached = cache.lock().unwrap();
        assert_eq!(
            cached.as_ref().unwrap().analysis.engagement_level,
            Engagement::High
        );
    }

    #[tokio::test]
    async fn should_deliver_records_title_immediately() {
        let body = r#"{"reminder": {"should_deliver": true, "which_reminder": "evening pill"}}"#;
        let (session, mut director, _pipeline) = fixture(body);

        turn(&mut director, "sure, what is it").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.lock().unwrap().is_reminder_delivered("evening pill"));
    }

    #[tokio::test]
    async fn goodbye_in_progress_suppresses_injection() {
        let body = r#"{"analysis": {"engagement_level": "low"}}"#;
        let (session, mut director, _pipeline) = fixture(body);
        turn(&mut director, "fine").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        session.lock().unwrap().goodbye_in_progress = true;
        let ctx = turn(&mut director, "bye now").await;
        assert!(director_appends(&ctx).is_empty());
    }

    #[tokio::test]
    async fn hard_limit_schedules_non_cancellable_end() {
        let (session, mut director, pipeline) = fixture("{}");
        session.lock().unwrap().started_at =
            chrono::Utc::now() - ChronoDuration::seconds(12 * 60 + 1);

        turn(&mut director, "and then she said").await;

        let s = session.lock().unwrap();
        assert_eq!(s.termination_reason, Some(EndReason::HardLimit));
        assert!(s.call_ending_initiated);
        drop(s);
        // not cancellable by the barge-in path
        assert!(!pipeline.handle().cancel_scheduled_end());
    }

    #[tokio::test]
    async fn nine_minutes_forces_winding_down_advisory() {
        let body = r#"{"guidance": {"specific_instruction": "ask about the garden"}}"#;
        let (session, mut director, _pipeline) = fixture(body);
        turn(&mut director, "hello").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        session.lock().unwrap().started_at = chrono::Utc::now() - ChronoDuration::minutes(10);
        // this turn notices the clock...
        turn(&mut director, "mm").await;
        // ...and the next injection is forced to winding-down
        let ctx = turn(&mut director, "go on").await;
        let appends = director_appends(&ctx);
        assert!(appends[0].contains("winding_down/"));
    }

    #[tokio::test]
    async fn closing_phase_past_eight_minutes_schedules_close_out() {
        let body = r#"{"analysis": {"call_phase": "closing"}}"#;
        let (session, mut director, pipeline) = fixture(body);
        turn(&mut director, "hello").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        session.lock().unwrap().started_at = chrono::Utc::now() - ChronoDuration::minutes(9);
        turn(&mut director, "well that's all").await;
        // the close-out is cancellable — renewed talk withdraws it
        assert!(pipeline.handle().cancel_scheduled_end());
    }
}
