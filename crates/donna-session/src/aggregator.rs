use async_trait::async_trait;

use donna_core::types::ChatMessage;
use donna_pipeline::{Direction, Frame, PipelineError, Processor, ProcessorContext};

/// Turns final user transcripts into generation-triggering message appends.
///
/// Guidance injections from the observer stack always ride
/// `MessagesAppend { run_llm: false }` and only accumulate; this aggregator
/// is the single place that sets `run_llm: true`, so exactly one generation
/// is queued per user turn.
pub struct ContextAggregator;

impl ContextAggregator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ContextAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for ContextAggregator {
    fn name(&self) -> &'static str {
        "context_aggregator"
    }

    async fn process(
        &mut self,
        frame: Frame,
        direction: Direction,
        ctx: &mut ProcessorContext,
    ) -> Result<(), PipelineError> {
        match &frame {
            Frame::Transcription {
                text,
                is_final: true,
            } if direction == Direction::Downstream && !text.trim().is_empty() => {
                let message = ChatMessage::user(text.trim());
                ctx.forward(frame, direction);
                ctx.emit(Frame::MessagesAppend {
                    messages: vec![message],
                    run_llm: true,
                });
            }
            _ => ctx.forward(frame, direction),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use donna_core::types::Role;

    #[tokio::test]
    async fn final_transcript_triggers_exactly_one_generation() {
        let mut agg = ContextAggregator::new();
        let mut ctx = ProcessorContext::default();
        agg.process(
            Frame::Transcription {
                text: "hello there".into(),
                is_final: true,
            },
            Direction::Downstream,
            &mut ctx,
        )
        .await
        .unwrap();

        let appends: Vec<_> = ctx
            .out
            .iter()
            .filter_map(|(f, _)| match f {
                Frame::MessagesAppend { messages, run_llm } => Some((messages.clone(), *run_llm)),
                _ => None,
            })
            .collect();
        assert_eq!(appends.len(), 1);
        assert!(appends[0].1);
        assert_eq!(appends[0].0[0].role, Role::User);
        assert_eq!(appends[0].0[0].content, "hello there");
        // the transcription itself is still forwarded for the tracker
        assert!(ctx
            .out
            .iter()
            .any(|(f, _)| matches!(f, Frame::Transcription { .. })));
    }

    #[tokio::test]
    async fn interim_and_empty_transcripts_do_not_trigger() {
        let mut agg = ContextAggregator::new();
        for frame in [
            Frame::Transcription {
                text: "partial".into(),
                is_final: false,
            },
            Frame::Transcription {
                text: "   ".into(),
                is_final: true,
            },
        ] {
            let mut ctx = ProcessorContext::default();
            agg.process(frame, Direction::Downstream, &mut ctx)
                .await
                .unwrap();
            assert!(!ctx
                .out
                .iter()
                .any(|(f, _)| matches!(f, Frame::MessagesAppend { .. })));
        }
    }

    #[tokio::test]
    async fn guidance_appends_pass_through_untouched() {
        let mut agg = ContextAggregator::new();
        let mut ctx = ProcessorContext::default();
        agg.process(
            Frame::MessagesAppend {
                messages: vec![ChatMessage::user("[HEALTH] acknowledge gently")],
                run_llm: false,
            },
            Direction::Downstream,
            &mut ctx,
        )
        .await
        .unwrap();
        assert_eq!(ctx.out.len(), 1);
        assert!(
            matches!(&ctx.out[0].0, Frame::MessagesAppend { run_llm: false, .. })
        );
    }
}
