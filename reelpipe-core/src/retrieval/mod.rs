mod error;
mod instagram;
pub mod naming;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{PipelineConfig, SidecarContent};
use crate::post;
use crate::queue::{DeadLetterLog, QueueFile};

pub use error::{RetrievalError, RetrievalResult};
pub use instagram::{parse_media_info, InstagramRetriever, PostContent};
pub use types::{
    AbandonedItem, AttemptOutcome, MediaArtifact, RetrievalReport, RetrievedPost, RetryPolicy,
};

/// Resolves a post shortcode to its media, written somewhere under `workdir`.
#[async_trait]
pub trait MediaRetriever: Send + Sync {
    async fn retrieve(&self, shortcode: &str, workdir: &Path) -> RetrievalResult<RetrievedPost>;
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub media_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub caption_words: usize,
    pub max_name_length: usize,
    pub media_extension: String,
    pub sidecar: SidecarContent,
    pub dead_letter_file: Option<PathBuf>,
}

impl From<&PipelineConfig> for RetrievalConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            media_dir: config.media_dir(),
            staging_dir: config.staging_dir(),
            caption_words: config.retrieval.caption_words,
            max_name_length: config.retrieval.max_name_length,
            media_extension: config
                .retrieval
                .media_extension
                .trim_start_matches('.')
                .to_string(),
            sidecar: config.retrieval.sidecar,
            dead_letter_file: config.dead_letter_file(),
        }
    }
}

/// Drains the queue: every identifier gets up to `max_attempts` tries, then
/// the queue file is truncated no matter how the items fared.
pub struct RetrievalLoop {
    config: RetrievalConfig,
    policy: RetryPolicy,
    retriever: Arc<dyn MediaRetriever>,
    dead_letter: Option<DeadLetterLog>,
}

impl RetrievalLoop {
    pub fn new(
        config: RetrievalConfig,
        policy: RetryPolicy,
        retriever: Arc<dyn MediaRetriever>,
    ) -> RetrievalResult<Self> {
        if policy.max_attempts == 0 {
            return Err(RetrievalError::Configuration(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        let dead_letter = config.dead_letter_file.as_ref().map(DeadLetterLog::new);
        Ok(Self {
            config,
            policy,
            retriever,
            dead_letter,
        })
    }

    pub fn from_pipeline(
        config: &PipelineConfig,
        retriever: Arc<dyn MediaRetriever>,
    ) -> RetrievalResult<Self> {
        let policy = RetryPolicy::try_from(&config.retrieval)?;
        Self::new(RetrievalConfig::from(config), policy, retriever)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub async fn run(&self, queue: &QueueFile) -> RetrievalResult<RetrievalReport> {
        let identifiers = queue.read().await?;
        let total = identifiers.len();
        let mut report = RetrievalReport::new(Uuid::new_v4(), total);
        info!(run_id = %report.run_id, total, queue = %queue.path().display(), "retrieval pass started");

        for (index, identifier) in identifiers.iter().enumerate() {
            info!(item = index + 1, total, identifier = %identifier, "retrieving");
            self.process_item(identifier, &mut report).await;
        }

        queue.clear().await?;
        report.queue_cleared = true;
        report.finished_at = Utc::now();
        info!(
            run_id = %report.run_id,
            retrieved = report.retrieved.len(),
            abandoned = report.abandoned.len(),
            calls = report.retriever_calls,
            "retrieval pass finished; queue cleared"
        );
        Ok(report)
    }

    async fn process_item(&self, identifier: &str, report: &mut RetrievalReport) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            report.retriever_calls += 1;
            let result = self.attempt(identifier).await;
            match self.policy.classify(attempt, result) {
                AttemptOutcome::Success(artifact) => {
                    info!(
                        identifier = %identifier,
                        attempt,
                        media = %artifact.media_path.display(),
                        "retrieved"
                    );
                    report.retrieved.push(artifact);
                    return;
                }
                AttemptOutcome::Retryable(err) => {
                    let delay = self.policy.backoff.next_delay();
                    warn!(
                        identifier = %identifier,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        wait = ?delay,
                        error = %err,
                        "retrieval attempt failed; retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                AttemptOutcome::Exhausted(err) => {
                    error!(
                        identifier = %identifier,
                        attempts = attempt,
                        error = %err,
                        "giving up on identifier"
                    );
                    self.record_dead_letter(identifier, &err).await;
                    report.abandoned.push(AbandonedItem {
                        identifier: identifier.to_string(),
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                    return;
                }
            }
        }
    }

    /// One try in its own working directory, which is gone when this returns.
    /// Folder setup failures count against the item, like any other error.
    async fn attempt(&self, identifier: &str) -> RetrievalResult<MediaArtifact> {
        create_dir(&self.config.staging_dir).await?;
        create_dir(&self.config.media_dir).await?;
        let workdir = tempfile::Builder::new()
            .prefix("reelpipe-")
            .tempdir_in(&self.config.staging_dir)
            .map_err(|source| RetrievalError::Io {
                source,
                path: self.config.staging_dir.clone(),
            })?;
        let shortcode = post::shortcode(identifier);
        let result = match self.retriever.retrieve(shortcode, workdir.path()).await {
            Ok(retrieved) => self.finalize(identifier, retrieved).await,
            Err(err) => Err(err),
        };
        cleanup_workdir(workdir);
        result
    }

    async fn finalize(
        &self,
        identifier: &str,
        retrieved: RetrievedPost,
    ) -> RetrievalResult<MediaArtifact> {
        if fs::metadata(&retrieved.media_path).await.is_err() {
            return Err(RetrievalError::NoMedia {
                shortcode: retrieved.shortcode,
            });
        }
        let base_name = naming::base_name(
            &retrieved.shortcode,
            retrieved.caption.as_deref(),
            self.config.caption_words,
            self.config.max_name_length,
        );
        let extension = retrieved
            .media_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or(self.config.media_extension.as_str())
            .to_string();
        let media_path = self
            .config
            .media_dir
            .join(format!("{base_name}.{extension}"));
        move_file(&retrieved.media_path, &media_path).await?;

        let sidecar_body = match self.config.sidecar {
            SidecarContent::SourceUrl => Some(identifier.to_string()),
            SidecarContent::Caption => Some(retrieved.caption.clone().unwrap_or_default()),
            SidecarContent::None => None,
        };
        let sidecar_path = match sidecar_body {
            Some(body) => {
                let path = self.config.media_dir.join(format!("{base_name}.txt"));
                if let Err(source) = fs::write(&path, body).await {
                    // Media without its sidecar must not reach the delivery folder.
                    discard_media(&media_path).await;
                    return Err(RetrievalError::Io { source, path });
                }
                Some(path)
            }
            None => None,
        };

        Ok(MediaArtifact {
            identifier: identifier.to_string(),
            base_name,
            media_path,
            sidecar_path,
        })
    }

    async fn record_dead_letter(&self, identifier: &str, err: &RetrievalError) {
        if let Some(log) = &self.dead_letter {
            if let Err(log_err) = log.record(identifier, &err.to_string()).await {
                warn!(
                    identifier = %identifier,
                    path = %log.path().display(),
                    error = %log_err,
                    "failed to record abandoned identifier"
                );
            }
        }
    }
}

fn cleanup_workdir(workdir: TempDir) {
    let path = workdir.path().to_path_buf();
    match workdir.close() {
        Ok(()) => debug!(path = %path.display(), "removed working directory"),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to clean working directory")
        }
    }
}

async fn discard_media(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %err, "failed to remove media after sidecar error");
    }
}

async fn create_dir(path: &Path) -> RetrievalResult<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| RetrievalError::Io {
            source,
            path: path.to_path_buf(),
        })
}

async fn move_file(from: &Path, to: &Path) -> RetrievalResult<()> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // Cross-device moves fail to rename; fall back to copy and remove.
    fs::copy(from, to)
        .await
        .map_err(|source| RetrievalError::Io {
            source,
            path: to.to_path_buf(),
        })?;
    if let Err(err) = fs::remove_file(from).await {
        warn!(path = %from.display(), error = %err, "failed to remove staged media after copy");
    }
    Ok(())
}
