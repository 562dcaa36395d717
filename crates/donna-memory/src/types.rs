use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of memory this is. Concerns always surface in the critical
/// tier regardless of score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Fact,
    Preference,
    Event,
    Concern,
    Relationship,
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fact => write!(f, "fact"),
            Self::Preference => write!(f, "preference"),
            Self::Event => write!(f, "event"),
            Self::Concern => write!(f, "concern"),
            Self::Relationship => write!(f, "relationship"),
        }
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "preference" => Ok(Self::Preference),
            "event" => Ok(Self::Event),
            "concern" => Ok(Self::Concern),
            "relationship" => Ok(Self::Relationship),
            other => Err(format!("unknown memory type: {other}")),
        }
    }
}

/// A stored memory row.
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    pub id: String,
    pub senior_id: String,
    pub memory_type: MemoryType,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Base importance 0–100; decays on read, never in place.
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u32,
    pub source_call_id: Option<String>,
}

/// Search result in the external wire shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHit {
    pub id: String,
    pub senior_id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub content: String,
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl MemoryHit {
    pub fn from_record(record: &MemoryRecord, similarity: Option<f32>) -> Self {
        Self {
            id: record.id.clone(),
            senior_id: record.senior_id.clone(),
            memory_type: record.memory_type,
            content: record.content.clone(),
            importance: record.importance,
            created_at: record.created_at,
            last_accessed_at: record.last_accessed_at,
            similarity,
        }
    }
}
