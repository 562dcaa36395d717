//! `donna-pipeline` — the per-call frame pipeline runtime.
//!
//! # Overview
//!
//! Every active call runs one [`Pipeline`]: a linear chain of
//! [`Processor`]s exchanging typed [`Frame`]s. Frames travel downstream
//! (telephony input → telephony output) or upstream (used for barge-in
//! clears). The runtime is cooperatively single-threaded: one processor
//! handles one frame at a time, in program order, so adjacent processors
//! never see more than one frame in flight.
//!
//! Async side-work (STT sockets, TTS synthesis, LLM streaming, delayed
//! goodbye ends) re-enters the chain through a [`PipelineHandle`], which
//! injects frames at a named position in arrival order.

pub mod frame;
pub mod processor;
pub mod runtime;
pub mod stripper;

pub use frame::{AudioEncoding, AudioFrame, Direction, Frame};
pub use processor::{Processor, ProcessorContext};
pub use runtime::{Pipeline, PipelineError, PipelineHandle, PipelineState};
pub use stripper::GuidanceStripper;
