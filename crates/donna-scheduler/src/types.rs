use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    Medication,
    Appointment,
    Custom,
}

impl std::fmt::Display for ReminderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Medication => write!(f, "medication"),
            Self::Appointment => write!(f, "appointment"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for ReminderType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "medication" => Ok(Self::Medication),
            "appointment" => Ok(Self::Appointment),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown reminder type: {other}")),
        }
    }
}

/// When a reminder fires. One-shot reminders carry an absolute instant;
/// recurring ones carry a local time-of-day evaluated in the senior's
/// timezone, one fresh instance per calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recurrence {
    Once { at: DateTime<Utc> },
    Daily { hour: u8, minute: u8 },
    Weekly { day: u8, hour: u8, minute: u8 },
}

/// A persisted reminder definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub senior_id: String,
    pub reminder_type: ReminderType,
    pub title: String,
    pub description: String,
    pub schedule: Recurrence,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Delivery lifecycle. Clients depend on these exact strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Acknowledged,
    Confirmed,
    RetryPending,
    MaxAttempts,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Acknowledged | DeliveryStatus::Confirmed | DeliveryStatus::MaxAttempts
        )
    }

    /// The legal edges of the state machine.
    pub fn can_transition(&self, to: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        match (self, to) {
            (Delivered, Acknowledged)
            | (Delivered, Confirmed)
            | (Delivered, RetryPending)
            | (Delivered, MaxAttempts) => true,
            (RetryPending, Delivered) | (RetryPending, MaxAttempts) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Delivered => "delivered",
            Self::Acknowledged => "acknowledged",
            Self::Confirmed => "confirmed",
            Self::RetryPending => "retry_pending",
            Self::MaxAttempts => "max_attempts",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivered" => Ok(Self::Delivered),
            "acknowledged" => Ok(Self::Acknowledged),
            "confirmed" => Ok(Self::Confirmed),
            "retry_pending" => Ok(Self::RetryPending),
            "max_attempts" => Ok(Self::MaxAttempts),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

/// One attempt (or chain of attempts) to deliver one reminder instance.
/// Instance identity is `(reminder_id, scheduled_for)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: String,
    pub reminder_id: String,
    /// The instance being delivered (UTC instant of the occurrence).
    pub scheduled_for: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub call_id: Option<String>,
    pub attempt_count: u32,
    pub status: DeliveryStatus,
    pub user_response: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeliveryStatus::*;

    #[test]
    fn status_strings_are_the_contract() {
        for (status, s) in [
            (Delivered, "delivered"),
            (Acknowledged, "acknowledged"),
            (Confirmed, "confirmed"),
            (RetryPending, "retry_pending"),
            (MaxAttempts, "max_attempts"),
        ] {
            assert_eq!(status.to_string(), s);
            assert_eq!(s.parse::<DeliveryStatus>().unwrap(), status);
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for terminal in [Acknowledged, Confirmed, MaxAttempts] {
            assert!(terminal.is_terminal());
            for to in [Delivered, Acknowledged, Confirmed, RetryPending, MaxAttempts] {
                assert!(!terminal.can_transition(to), "{terminal} → {to} must be illegal");
            }
        }
    }

    #[test]
    fn delivered_can_resolve_or_retry() {
        assert!(Delivered.can_transition(Acknowledged));
        assert!(Delivered.can_transition(Confirmed));
        assert!(Delivered.can_transition(RetryPending));
        assert!(Delivered.can_transition(MaxAttempts));
        assert!(!Delivered.can_transition(Delivered));
    }

    #[test]
    fn retry_pending_can_only_refire_or_exhaust() {
        assert!(RetryPending.can_transition(Delivered));
        assert!(RetryPending.can_transition(MaxAttempts));
        assert!(!RetryPending.can_transition(Acknowledged));
        assert!(!RetryPending.can_transition(Confirmed));
    }

    #[test]
    fn recurrence_serializes_tagged() {
        let daily = Recurrence::Daily { hour: 8, minute: 30 };
        let json = serde_json::to_string(&daily).unwrap();
        assert!(json.contains(r#""kind":"daily""#));
        let back: Recurrence = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Recurrence::Daily { hour: 8, minute: 30 }));
    }
}
