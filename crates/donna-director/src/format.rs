//! Cached analysis → the compact guidance line injected next turn.
//!
//! Shape: `phase/engagement | action | (tone)` where the action follows the
//! priority ladder below and the tone marker only appears when notable.

use crate::schema::{CallPhase, DirectorResult, Engagement, StayOrShift, Tone};

/// Stage directions that must never be spoken; instructions containing them
/// are skipped in favor of the next candidate.
const STAGE_DIRECTIONS: &[&str] = &["laugh", "pause", "sigh", "smile", "nod"];

const INSTRUCTION_MAX_CHARS: usize = 90;

/// Render the compact guidance line. `force_winding_down` is the 9-minute
/// advisory override. Returns `None` when there is nothing worth injecting.
pub fn compact_guidance(result: &DirectorResult, force_winding_down: bool) -> Option<String> {
    let phase = if force_winding_down && result.analysis.call_phase != CallPhase::Closing {
        CallPhase::WindingDown
    } else {
        result.analysis.call_phase
    };

    let action = if phase == CallPhase::Closing {
        "CLOSING: Say a warm goodbye. Keep it brief.".to_string()
    } else if phase == CallPhase::WindingDown {
        "WINDING DOWN: Summarize key points, confirm action items, begin warm sign-off."
            .to_string()
    } else if result.reminder.should_deliver {
        let which = result
            .reminder
            .which_reminder
            .as_deref()
            .unwrap_or("the pending reminder");
        format!("REMIND: {which}")
    } else if result.analysis.engagement_level == Engagement::Low {
        "RE-ENGAGE".to_string()
    } else if result.direction.stay_or_shift == StayOrShift::Transition {
        match result.direction.next_topic.as_deref() {
            Some(topic) => format!("SHIFT→{topic}"),
            None => "WRAP-UP".to_string(),
        }
    } else if result.direction.stay_or_shift == StayOrShift::WrapUp {
        "WRAP-UP".to_string()
    } else {
        let instruction = result.guidance.specific_instruction.trim();
        if instruction.is_empty() || contains_stage_direction(instruction) {
            return None;
        }
        truncate(instruction, INSTRUCTION_MAX_CHARS)
    };

    let mut line = format!(
        "{}/{} | {}",
        phase_label(phase),
        engagement_label(result.analysis.engagement_level),
        action
    );
    match result.analysis.emotional_tone {
        Tone::Sad => line.push_str(" | (they sound sad)"),
        Tone::Concerned => line.push_str(" | (they sound concerned)"),
        _ => {}
    }
    Some(line)
}

fn contains_stage_direction(instruction: &str) -> bool {
    let lower = instruction.to_lowercase();
    STAGE_DIRECTIONS.iter().any(|w| lower.contains(w))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}…", cut.trim_end())
    }
}

fn phase_label(phase: CallPhase) -> &'static str {
    match phase {
        CallPhase::Opening => "opening",
        CallPhase::Rapport => "rapport",
        CallPhase::Main => "main",
        CallPhase::WindingDown => "winding_down",
        CallPhase::Closing => "closing",
    }
}

fn engagement_label(e: Engagement) -> &'static str {
    match e {
        Engagement::High => "high",
        Engagement::Medium => "medium",
        Engagement::Low => "low",
    }
}
