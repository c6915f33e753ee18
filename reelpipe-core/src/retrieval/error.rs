use std::path::PathBuf;

use thiserror::Error;

use crate::queue::QueueError;
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("post {shortcode} has no downloadable media")]
    NoMedia { shortcode: String },
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Parse(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for RetrievalError {
    fn from(error: reqwest::Error) -> Self {
        RetrievalError::Network(error.to_string())
    }
}

impl From<serde_json::Error> for RetrievalError {
    fn from(error: serde_json::Error) -> Self {
        RetrievalError::Parse(error.to_string())
    }
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;
