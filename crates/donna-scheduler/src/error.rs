use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("reminder not found: {id}")]
    ReminderNotFound { id: String },

    #[error("delivery not found: {id}")]
    DeliveryNotFound { id: String },

    #[error("illegal delivery transition: {from} → {to}")]
    IllegalTransition { from: String, to: String },

    #[error("telephony error: {0}")]
    Telephony(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
