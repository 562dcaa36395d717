//! `donna-session` — per-call mutable state and the processors that keep it
//! current.
//!
//! One [`CallSession`] exists per telephony call, owned by the pipeline task
//! and shared (behind a mutex with short critical sections) with the quick
//! observer, the director's background analysis task, the LLM context
//! builder, and the post-call orchestrator.

pub mod aggregator;
pub mod state;
pub mod tracker;

pub use aggregator::ContextAggregator;
pub use state::{
    AckKind, CallSession, PendingReminder, ReminderResponse, SharedSession, TranscriptTurn,
    TurnMetrics,
};
pub use tracker::ConversationTracker;
