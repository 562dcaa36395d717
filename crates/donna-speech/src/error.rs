use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("STT socket error: {0}")]
    SttSocket(String),

    #[error("TTS request error: {0}")]
    Tts(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SpeechError>;
