use thiserror::Error;

#[derive(Debug, Error)]
pub enum DonnaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telephony error: {0}")]
    Telephony(String),

    #[error("Speech service error: {0}")]
    Speech(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Senior not found: {id}")]
    SeniorNotFound { id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DonnaError>;
