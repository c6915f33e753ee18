use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("upload rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(error: reqwest::Error) -> Self {
        DeliveryError::Network(error.to_string())
    }
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;
