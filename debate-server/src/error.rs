//! Error types for the relay service.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// A required credential or setting is absent. Raised before any network call.
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Upstream(#[from] async_openai::error::OpenAIError),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    InvalidRequest,
    Internal,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Configuration(_) => ErrorKind::Configuration,
            ServiceError::Upstream(_)
            | ServiceError::Http(_)
            | ServiceError::Timeout(_)
            | ServiceError::Transport(_) => ErrorKind::Transport,
            ServiceError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ServiceError::Io(_) | ServiceError::Wav(_) | ServiceError::Synthesis(_) => {
                ErrorKind::Internal
            }
        }
    }
}
