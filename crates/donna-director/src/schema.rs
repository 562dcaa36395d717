use serde::{Deserialize, Serialize};

/// Conversational stage, as the director sees it. Five phases on the wire;
/// downstream flow control treats them as advice, not a state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    Opening,
    #[default]
    Rapport,
    Main,
    WindingDown,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Engagement {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Positive,
    #[default]
    Neutral,
    Concerned,
    Sad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StayOrShift {
    #[default]
    Stay,
    Transition,
    WrapUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    #[default]
    Good,
    TooFast,
    Dragging,
    TimeToClose,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Analysis {
    #[serde(default)]
    pub call_phase: CallPhase,
    #[serde(default)]
    pub engagement_level: Engagement,
    #[serde(default)]
    pub current_topic: Option<String>,
    #[serde(default)]
    pub emotional_tone: Tone,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectionAdvice {
    #[serde(default)]
    pub stay_or_shift: StayOrShift,
    #[serde(default)]
    pub next_topic: Option<String>,
    #[serde(default)]
    pub pacing_note: Pacing,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReminderAdvice {
    #[serde(default)]
    pub should_deliver: bool,
    #[serde(default)]
    pub which_reminder: Option<String>,
    #[serde(default)]
    pub delivery_approach: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GuidanceAdvice {
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub priority_action: String,
    #[serde(default)]
    pub specific_instruction: String,
}

/// The canonical director output. At most one is cached per call; a new
/// analysis replaces it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectorResult {
    #[serde(default)]
    pub analysis: Analysis,
    #[serde(default)]
    pub direction: DirectionAdvice,
    #[serde(default)]
    pub reminder: ReminderAdvice,
    #[serde(default)]
    pub guidance: GuidanceAdvice,
    #[serde(default)]
    pub model_recommendation: Option<String>,
}

impl DirectorResult {
    /// Deserialize from an already-repaired JSON value. Unknown fields are
    /// ignored, missing fields default; a non-object is a parse failure.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}
