//! `donna-director` — layer 2 of the guidance stack.
//!
//! Once per turn the director injects the previous turn's cached analysis
//! into the LLM context, applies the time-based fallbacks (hard limit,
//! advisory winding-down, closing-phase close-out), and dispatches a fresh
//! structured analysis in a detached task. The contract is strict:
//! observation in turn N shapes turn N+1, never turn N — by the time the
//! analysis lands, the current generation has already been queued.

pub mod director;
pub mod format;
pub mod schema;

pub use director::{DirectorContext, DirectorProcessor};
pub use format::compact_guidance;
pub use schema::{
    Analysis, CallPhase, DirectorResult, DirectionAdvice, Engagement, GuidanceAdvice, Pacing,
    ReminderAdvice, StayOrShift, Tone,
};
