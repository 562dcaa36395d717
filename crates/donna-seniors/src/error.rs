use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeniorError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("senior not found: {id}")]
    NotFound { id: String },
}

pub type Result<T> = std::result::Result<T, SeniorError>;
