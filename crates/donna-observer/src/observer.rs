use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use donna_core::types::{ChatMessage, EndReason};
use donna_pipeline::{Direction, Frame, PipelineError, PipelineHandle, Processor, ProcessorContext};
use donna_session::{AckKind, ReminderResponse, SharedSession};

use crate::guidance::{compose_guidance, token_budget};
use crate::rules::RuleSet;
use crate::signals::SignalBundle;

/// Acknowledgment rules below this confidence are treated as chatter.
const ACK_MIN_CONFIDENCE: f64 = 0.7;

/// Layer 1 of the guidance stack ("observer") — synchronous and
/// pattern-driven.
///
/// For each final transcript it classifies against the reference rule-set
/// and, when anything matched, injects one accumulate-only guidance message
/// ahead of the transcript. A strong goodbye arms the delayed end frame;
/// reminder-acknowledgment matches land on the session for the delivery
/// tracker. Every frame received is forwarded unchanged.
pub struct QuickObserver {
    rules: RuleSet,
    session: SharedSession,
    handle: PipelineHandle,
    goodbye_silence: Duration,
}

impl QuickObserver {
    pub fn new(session: SharedSession, handle: PipelineHandle, goodbye_silence: Duration) -> Self {
        Self {
            rules: RuleSet::compile(),
            session,
            handle,
            goodbye_silence,
        }
    }

    fn on_final_transcript(&mut self, text: &str, ctx: &mut ProcessorContext) {
        let bundle = self.rules.classify(text);
        if bundle.is_empty() {
            return;
        }

        self.apply_side_effects(text, &bundle);

        if let Some(line) = compose_guidance(&bundle) {
            debug!(guidance = %line, "observer guidance");
            let mut session = self.session.lock().unwrap();
            session.metrics.guidance_injections += 1;
            session.token_budget_hint = Some(token_budget(&bundle));
            drop(session);

            // accumulate-only: the transcript that follows is what triggers
            // generation
            ctx.emit(Frame::MessagesAppend {
                messages: vec![ChatMessage::user(line)],
                run_llm: false,
            });
        }
    }

    fn apply_side_effects(&self, text: &str, bundle: &SignalBundle) {
        if bundle.strong_goodbye() {
            let mut session = self.session.lock().unwrap();
            if !session.goodbye_in_progress {
                info!(call_id = %session.call_id, "strong goodbye — scheduling end");
                session.goodbye_in_progress = true;
                session.senior_said_goodbye = true;
                session.call_ending_initiated = true;
                drop(session);
                // cancellable: speaking again within the window withdraws it
                self.handle
                    .schedule_end(self.goodbye_silence, EndReason::Goodbye, true);
            }
        }

        if let Some(ack) = bundle.best_acknowledgment() {
            if ack.confidence >= ACK_MIN_CONFIDENCE {
                let kind = match ack.signal {
                    "already_done" | "just_did" | "on_it" => AckKind::Confirmed,
                    _ => AckKind::Acknowledged,
                };
                let mut session = self.session.lock().unwrap();
                debug!(
                    call_id = %session.call_id,
                    signal = ack.signal,
                    confidence = ack.confidence,
                    "reminder acknowledgment"
                );
                session.record_reminder_response(ReminderResponse {
                    kind,
                    text: text.to_string(),
                    confidence: ack.confidence,
                });
            }
        }
    }
}

#[async_trait]
impl Processor for QuickObserver {
    fn name(&self) -> &'static str {
        "observer"
    }

    async fn process(
        &mut self,
        frame: Frame,
        direction: Direction,
        ctx: &mut ProcessorContext,
    ) -> Result<(), PipelineError> {
        if let Frame::Transcription {
            text,
            is_final: true,
        } = &frame
        {
            if direction == Direction::Downstream {
                self.on_final_transcript(text, ctx);
            }
        }
        // passthrough contract: everything is forwarded unchanged
        ctx.forward(frame, direction);
        Ok(())
    }
}
