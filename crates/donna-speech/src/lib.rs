//! `donna-speech` — streaming STT and TTS adapters as pipeline processors.
//!
//! Both sides run their network I/O in per-call worker tasks so the pipeline
//! never blocks on a provider: the STT processor feeds audio into a Deepgram
//! socket and injects transcription frames back; the TTS processor queues
//! sentence chunks into an ElevenLabs synthesis worker that injects PCM
//! audio as it arrives.

pub mod deepgram;
pub mod elevenlabs;
pub mod error;

pub use deepgram::SttProcessor;
pub use elevenlabs::TtsProcessor;
pub use error::{Result, SpeechError};
