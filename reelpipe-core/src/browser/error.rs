use thiserror::Error;

use crate::queue::QueueError;
use crate::session::SessionError;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("session store error: {0}")]
    Session(#[from] SessionError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}
