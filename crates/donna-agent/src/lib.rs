//! `donna-agent` — LLM access for the call pipeline and the analysis tasks.
//!
//! One [`LlmProvider`] implementation per backend (Anthropic, OpenAI,
//! Gemini); which one a call uses is a configuration decision made at
//! bootstrap, never per turn. The [`ResponseGenerator`] processor owns the
//! rolling conversation and streams replies back into the pipeline;
//! [`repair`] mends the malformed JSON that structured-analysis prompts
//! sometimes return.

pub mod anthropic;
pub mod anthropic_stream;
pub mod gemini;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod repair;
pub mod responder;
pub mod stream;

use std::sync::Arc;

use donna_core::config::{LlmBackend, LlmConfig};

pub use prompt::SystemPromptBuilder;
pub use provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
pub use repair::parse_json_lenient;
pub use responder::ResponseGenerator;
pub use stream::StreamEvent;

/// Build the configured provider. The adapter is chosen once per process.
pub fn build_provider(cfg: &LlmConfig) -> Arc<dyn LlmProvider> {
    match cfg.backend {
        LlmBackend::Anthropic => Arc::new(anthropic::AnthropicProvider::new(
            cfg.anthropic_api_key.clone(),
            None,
        )),
        LlmBackend::OpenAi => Arc::new(openai::OpenAiProvider::new(
            cfg.openai_api_key.clone(),
            None,
        )),
        LlmBackend::Gemini => Arc::new(gemini::GeminiProvider::new(cfg.gemini_api_key.clone())),
    }
}
