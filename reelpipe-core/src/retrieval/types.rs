use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::RetrievalSection;
use crate::pacing::Pacer;

use super::error::{RetrievalError, RetrievalResult};

/// What a retriever hands back: the post's caption and the media file it
/// wrote inside the working directory.
#[derive(Debug, Clone)]
pub struct RetrievedPost {
    pub shortcode: String,
    pub caption: Option<String>,
    pub media_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaArtifact {
    pub identifier: String,
    pub base_name: String,
    pub media_path: PathBuf,
    pub sidecar_path: Option<PathBuf>,
}

/// Result of one retrieval attempt, already classified against the retry budget.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(MediaArtifact),
    Retryable(RetrievalError),
    Exhausted(RetrievalError),
}

#[derive(Debug, Clone, Serialize)]
pub struct AbandonedItem {
    pub identifier: String,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalReport {
    pub run_id: Uuid,
    pub attempted: usize,
    pub retrieved: Vec<MediaArtifact>,
    pub abandoned: Vec<AbandonedItem>,
    pub retriever_calls: u32,
    pub queue_cleared: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RetrievalReport {
    pub(crate) fn new(run_id: Uuid, attempted: usize) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            attempted,
            retrieved: Vec::new(),
            abandoned: Vec::new(),
            retriever_calls: 0,
            queue_cleared: false,
            started_at: now,
            finished_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Pacer,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Pacer) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn classify(&self, attempt: u32, result: RetrievalResult<MediaArtifact>) -> AttemptOutcome {
        match result {
            Ok(artifact) => AttemptOutcome::Success(artifact),
            Err(err) if attempt >= self.max_attempts => AttemptOutcome::Exhausted(err),
            Err(err) => AttemptOutcome::Retryable(err),
        }
    }
}

impl TryFrom<&RetrievalSection> for RetryPolicy {
    type Error = RetrievalError;

    fn try_from(section: &RetrievalSection) -> Result<Self, Self::Error> {
        if section.max_retries == 0 {
            return Err(RetrievalError::Configuration(
                "max_retries must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_attempts: section.max_retries,
            backoff: Pacer::from_seconds(section.backoff_seconds),
        })
    }
}
