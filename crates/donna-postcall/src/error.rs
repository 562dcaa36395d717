use thiserror::Error;

#[derive(Debug, Error)]
pub enum PostCallError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("analysis error: {0}")]
    Analysis(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PostCallError>;
