use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use donna_core::types::ChatMessage;
use donna_pipeline::{Direction, Frame, PipelineError, PipelineHandle, Processor, ProcessorContext};
use donna_session::SharedSession;

use crate::provider::{ChatRequest, LlmProvider};
use crate::stream::StreamEvent;

/// Spoken when the provider fails or times out mid-call.
const FALLBACK_LINE: &str = "I'm right here with you. Tell me more about that.";

/// Whole-generation guard; a turn that takes longer than this degrades to
/// the fallback line.
const GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_MAX_TOKENS: u32 = 150;

/// The LLM stage of the pipeline ("llm").
///
/// Owns the rolling conversation. `MessagesAppend` frames accumulate into
/// it; the ones flagged `run_llm` start a streaming generation in a detached
/// task that injects sentence-sized `Text` frames back after this processor.
/// A reflected barge-in clear cancels the in-flight generation at its next
/// yield point.
pub struct ResponseGenerator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    system: String,
    session: SharedSession,
    handle: PipelineHandle,
    /// Shared with generation tasks so the assistant turn lands back in
    /// context once streaming completes.
    messages: Arc<Mutex<Vec<ChatMessage>>>,
    cancel: Option<CancellationToken>,
}

impl ResponseGenerator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        system: impl Into<String>,
        session: SharedSession,
        handle: PipelineHandle,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            system: system.into(),
            session,
            handle,
            messages: Arc::new(Mutex::new(Vec::new())),
            cancel: None,
        }
    }

    fn abort_generation(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    fn start_generation(&mut self) {
        // one generation at a time — a new trigger supersedes the old one
        self.abort_generation();

        let token = CancellationToken::new();
        self.cancel = Some(token.clone());

        let max_tokens = {
            let mut session = self.session.lock().unwrap();
            session.token_budget_hint.take().unwrap_or(DEFAULT_MAX_TOKENS)
        };

        let mut req = ChatRequest::new(&self.model, &self.system);
        req.messages = self.messages.lock().unwrap().clone();
        req.max_tokens = max_tokens;

        let provider = Arc::clone(&self.provider);
        let handle = self.handle.clone();
        let messages = Arc::clone(&self.messages);

        // supervised detached task: its only exits are completion, cancel,
        // timeout, or a logged degradation — never a lost panic
        tokio::spawn(async move {
            let work = generate(provider, req, handle.clone(), messages);
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("generation cancelled by barge-in");
                }
                _ = tokio::time::sleep(GENERATION_TIMEOUT) => {
                    warn!("generation timed out, speaking fallback");
                    let _ = handle
                        .inject_after("llm", Frame::Text { text: FALLBACK_LINE.to_string() })
                        .await;
                }
                _ = work => {}
            }
        });
    }
}

/// Stream one reply, injecting sentence-sized chunks as they complete.
async fn generate(
    provider: Arc<dyn LlmProvider>,
    req: ChatRequest,
    handle: PipelineHandle,
    messages: Arc<Mutex<Vec<ChatMessage>>>,
) {
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);

    {
        let provider = Arc::clone(&provider);
        let req = req.clone();
        tokio::spawn(async move {
            if let Err(e) = provider.send_stream(&req, tx).await {
                warn!(provider = provider.name(), error = %e, "stream request failed");
                // the receiver sees the closed channel and degrades
            }
        });
    }

    let mut full = String::new();
    let mut pending = String::new();

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::TextDelta { text } => {
                full.push_str(&text);
                pending.push_str(&text);
                // flush complete sentences so TTS can start early
                if let Some(boundary) = pending.rfind(['.', '!', '?']) {
                    let chunk: String = pending.drain(..=boundary).collect();
                    if !chunk.trim().is_empty() {
                        let _ = handle.inject_after("llm", Frame::Text { text: chunk }).await;
                    }
                }
            }
            StreamEvent::Done { tokens_out, .. } => {
                debug!(tokens_out, "generation complete");
            }
            StreamEvent::Error { message } => {
                warn!(error = %message, "generation stream error");
                break;
            }
        }
    }

    if !pending.trim().is_empty() {
        let _ = handle
            .inject_after("llm", Frame::Text { text: pending })
            .await;
    }

    if full.trim().is_empty() {
        // nothing usable arrived — degrade to the canned acknowledgment
        full = FALLBACK_LINE.to_string();
        let _ = handle
            .inject_after("llm", Frame::Text { text: FALLBACK_LINE.to_string() })
            .await;
    }

    messages.lock().unwrap().push(ChatMessage::assistant(full));
}

#[async_trait]
impl Processor for ResponseGenerator {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn process(
        &mut self,
        frame: Frame,
        direction: Direction,
        ctx: &mut ProcessorContext,
    ) -> Result<(), PipelineError> {
        match &frame {
            Frame::MessagesAppend { messages, run_llm } if direction == Direction::Downstream => {
                self.messages.lock().unwrap().extend(messages.iter().cloned());
                if *run_llm {
                    self.start_generation();
                }
            }
            Frame::InterruptClear => {
                self.abort_generation();
            }
            Frame::End { .. } | Frame::Cancel => {
                self.abort_generation();
            }
            _ => {}
        }
        ctx.forward(frame, direction);
        Ok(())
    }
}
