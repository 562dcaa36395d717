//! `donna-postcall` — everything that happens after the socket closes.
//!
//! The orchestrator runs a fixed sequence: persist the conversation, run
//! the AI call analysis, save it, extract memories, fold the call into the
//! daily context, finalize the delivery record, clear the per-call stashes.
//! Every step has its own error boundary; a failed step is logged and never
//! blocks the steps after it.

pub mod analysis;
pub mod db;
pub mod error;
pub mod extract;
pub mod orchestrator;
pub mod store;

pub use analysis::CallAnalysis;
pub use error::{PostCallError, Result};
pub use orchestrator::PostCallOrchestrator;
pub use store::ConversationStore;
