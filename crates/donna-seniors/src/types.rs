use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use donna_core::types::SeniorId;

/// The slice of a senior's record the core reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeniorProfile {
    pub id: SeniorId,
    pub first_name: String,
    /// E.164 number reminder calls are placed to.
    pub phone: String,
    /// IANA timezone name; drives local-day logic for daily context and
    /// recurring reminders.
    pub timezone: String,
    pub interests: Vec<String>,
    pub medical_notes: Option<String>,
    /// Free-text family descriptors ("son Tom in Denver, calls Sundays").
    pub family: Option<String>,
    pub is_active: bool,
}

impl SeniorProfile {
    /// Parse the stored timezone, falling back to UTC on bad data rather
    /// than failing the call.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// One-line summary for analysis prompts.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.interests.is_empty() {
            parts.push(format!("enjoys {}", self.interests.join(", ")));
        }
        if let Some(family) = &self.family {
            parts.push(format!("family: {family}"));
        }
        if parts.is_empty() {
            String::new()
        } else {
            parts.join("; ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_timezone_falls_back_to_utc() {
        let p = SeniorProfile {
            id: SeniorId::from("s-1"),
            first_name: "Margaret".into(),
            phone: "+15551234567".into(),
            timezone: "Mars/Olympus_Mons".into(),
            interests: vec![],
            medical_notes: None,
            family: None,
            is_active: true,
        };
        assert_eq!(p.tz(), chrono_tz::UTC);
    }

    #[test]
    fn summary_joins_what_exists() {
        let p = SeniorProfile {
            id: SeniorId::from("s-1"),
            first_name: "Margaret".into(),
            phone: "+15551234567".into(),
            timezone: "America/Denver".into(),
            interests: vec!["gardening".into()],
            medical_notes: None,
            family: Some("son Tom".into()),
            is_active: true,
        };
        assert_eq!(p.summary(), "enjoys gardening; family: son Tom");
    }
}
