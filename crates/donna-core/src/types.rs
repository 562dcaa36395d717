use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Twilio call identifier (`CAxxxx…`). Assigned by the provider; every piece
/// of per-call state is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a senior (UUIDv7 — time-sortable for easier log
/// correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeniorId(pub String);

impl SeniorId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SeniorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SeniorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SeniorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SeniorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Twilio media-stream identifier (`MZxxxx…`), valid for one socket lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Why a call was placed. Drives greeting style, reminder prompting, and
/// post-call delivery finalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    #[default]
    CheckIn,
    Reminder,
    Scheduled,
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallType::CheckIn => write!(f, "check_in"),
            CallType::Reminder => write!(f, "reminder"),
            CallType::Scheduled => write!(f, "scheduled"),
        }
    }
}

impl std::str::FromStr for CallType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "check_in" => Ok(CallType::CheckIn),
            "reminder" => Ok(CallType::Reminder),
            "scheduled" => Ok(CallType::Scheduled),
            other => Err(format!("unknown call type: {other}")),
        }
    }
}

/// A single message in the rolling LLM conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// Why a call ended. Recorded on the session and persisted post-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Natural goodbye exchange completed.
    Goodbye,
    /// Maximum call duration reached (12-minute hard limit).
    HardLimit,
    /// The director decided the conversation was over.
    DirectorClose,
    /// The telephony socket dropped.
    SocketClosed,
    /// Ambient deadline expired before any other terminal event.
    DeadlineExpired,
    /// Hard cancel — the pipeline was aborted without draining.
    Cancelled,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Goodbye => write!(f, "goodbye"),
            EndReason::HardLimit => write!(f, "hard_limit"),
            EndReason::DirectorClose => write!(f, "director_close"),
            EndReason::SocketClosed => write!(f, "socket_closed"),
            EndReason::DeadlineExpired => write!(f, "deadline_expired"),
            EndReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_type_round_trip() {
        for ct in [CallType::CheckIn, CallType::Reminder, CallType::Scheduled] {
            let s = ct.to_string();
            assert_eq!(s.parse::<CallType>().unwrap(), ct);
        }
    }

    #[test]
    fn senior_ids_are_sortable() {
        let a = SeniorId::new();
        let b = SeniorId::new();
        // UUIDv7 is time-ordered; two ids minted in sequence never collide.
        assert_ne!(a, b);
    }

    #[test]
    fn end_reason_serializes_snake_case() {
        let json = serde_json::to_string(&EndReason::HardLimit).unwrap();
        assert_eq!(json, r#""hard_limit""#);
    }
}
