use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Twilio API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed stream message: {0}")]
    Malformed(String),

    #[error("signature validation failed: {0}")]
    Signature(String),

    #[error("socket closed")]
    SocketClosed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
