use donna_core::types::{ChatMessage, EndReason};

/// Which way a frame is travelling through the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Input → output: audio in, transcripts, LLM text, audio out.
    Downstream,
    /// Output → input: barge-in clears.
    Upstream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// G.711 μ-law, one byte per sample.
    MulawU8,
    /// Little-endian signed 16-bit PCM.
    Pcm16,
}

#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
    pub encoding: AudioEncoding,
}

/// The unit of pipeline exchange.
#[derive(Debug, Clone)]
pub enum Frame {
    /// First frame of every call; moves the pipeline into `Running`.
    Start,

    /// A chunk of audio, inbound (caller) or outbound (synthesized).
    Audio(AudioFrame),

    /// Speech-to-text output. Interim frames drive barge-in; only final
    /// frames feed the guidance stack.
    Transcription { text: String, is_final: bool },

    /// A chunk of assistant text from the LLM stream.
    Text { text: String },

    /// Append messages to the rolling LLM conversation. `run_llm` says
    /// whether this append should immediately trigger generation; guidance
    /// injections always accumulate only.
    MessagesAppend {
        messages: Vec<ChatMessage>,
        run_llm: bool,
    },

    /// Result of a provider-side function call, fed back into context.
    FunctionResult {
        name: String,
        payload: serde_json::Value,
    },

    /// Upstream barge-in clear: abandon buffered output immediately.
    InterruptClear,

    /// Graceful termination — processors may flush their last work.
    End { reason: EndReason },

    /// Hard abort — no further work, no draining.
    Cancel,
}

impl Frame {
    /// Short tag for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Start => "start",
            Frame::Audio(_) => "audio",
            Frame::Transcription { .. } => "transcription",
            Frame::Text { .. } => "text",
            Frame::MessagesAppend { .. } => "messages_append",
            Frame::FunctionResult { .. } => "function_result",
            Frame::InterruptClear => "interrupt_clear",
            Frame::End { .. } => "end",
            Frame::Cancel => "cancel",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::End { .. } | Frame::Cancel)
    }
}
