mod error;
mod telegram;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::pacing::Pacer;

pub use error::{DeliveryError, DeliveryResult};
pub use telegram::TelegramClient;

/// Sends one media file with a caption to the configured destination.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Where uploads land, e.g. a chat id.
    fn destination(&self) -> &str;

    async fn send_media(&self, path: &Path, caption: &str) -> DeliveryResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Sent,
    Deleted,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryAttempt {
    pub media_path: PathBuf,
    pub caption: String,
    pub destination: String,
    pub state: DeliveryState,
    pub error: Option<String>,
}

impl DeliveryAttempt {
    fn pending(media_path: PathBuf, caption: String, destination: String) -> Self {
        Self {
            media_path,
            caption,
            destination,
            state: DeliveryState::Pending,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub run_id: Uuid,
    pub attempts: Vec<DeliveryAttempt>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeliveryReport {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            attempts: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Uploads confirmed by the destination, whether or not local removal worked.
    pub fn sent(&self) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| {
                matches!(attempt.state, DeliveryState::Sent | DeliveryState::Deleted)
            })
            .count()
    }

    pub fn failed(&self) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| attempt.state == DeliveryState::Failed)
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub media_dir: PathBuf,
    pub media_extensions: Vec<String>,
    pub fallback_caption: String,
    pub max_caption_chars: usize,
    pub pause: Pacer,
}

impl From<&PipelineConfig> for DeliveryConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            media_dir: config.media_dir(),
            media_extensions: config
                .delivery
                .media_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            fallback_caption: config.delivery.fallback_caption.clone(),
            max_caption_chars: config.delivery.max_caption_chars,
            pause: Pacer::fixed(config.delivery.pause_ms),
        }
    }
}

pub struct DeliveryLoop {
    config: DeliveryConfig,
    client: Arc<dyn MessagingClient>,
}

impl DeliveryLoop {
    pub fn new(config: DeliveryConfig, client: Arc<dyn MessagingClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub async fn run(&self) -> DeliveryResult<DeliveryReport> {
        let mut report = DeliveryReport::new();
        let media = match self.snapshot().await? {
            Some(media) => media,
            None => {
                info!(dir = %self.config.media_dir.display(), "media folder does not exist; nothing to deliver");
                report.finished_at = Utc::now();
                return Ok(report);
            }
        };
        let total = media.len();
        info!(run_id = %report.run_id, total, "delivery pass started");

        for (index, media_path) in media.into_iter().enumerate() {
            if index > 0 {
                self.config.pause.wait().await;
            }
            let attempt = self.deliver(media_path).await;
            report.attempts.push(attempt);
        }

        report.finished_at = Utc::now();
        info!(
            run_id = %report.run_id,
            sent = report.sent(),
            failed = report.failed(),
            "delivery pass finished"
        );
        Ok(report)
    }

    async fn deliver(&self, media_path: PathBuf) -> DeliveryAttempt {
        let sidecar = media_path.with_extension("txt");
        let caption = self.caption_for(&sidecar).await;
        let mut attempt =
            DeliveryAttempt::pending(media_path, caption, self.client.destination().to_string());

        let sent = self
            .client
            .send_media(&attempt.media_path, &attempt.caption)
            .await;
        if let Err(err) = sent {
            warn!(file = %attempt.media_path.display(), error = %err, "upload failed; keeping file");
            attempt.state = DeliveryState::Failed;
            attempt.error = Some(err.to_string());
            return attempt;
        }
        attempt.state = DeliveryState::Sent;
        info!(file = %attempt.media_path.display(), destination = %attempt.destination, "sent");

        let mut removed = true;
        if let Err(err) = fs::remove_file(&attempt.media_path).await {
            warn!(file = %attempt.media_path.display(), error = %err, "failed to delete delivered media");
            removed = false;
        }
        match fs::remove_file(&sidecar).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(file = %sidecar.display(), error = %err, "failed to delete caption sidecar");
                removed = false;
            }
        }
        if removed {
            attempt.state = DeliveryState::Deleted;
        }
        attempt
    }

    async fn caption_for(&self, sidecar: &Path) -> String {
        let caption = match fs::read_to_string(sidecar).await {
            Ok(contents) if !contents.trim().is_empty() => contents.trim().to_string(),
            _ => self.config.fallback_caption.clone(),
        };
        truncate_caption(&caption, self.config.max_caption_chars)
    }

    /// Media files present at loop start, sorted by name. `None` when the
    /// folder is missing.
    async fn snapshot(&self) -> DeliveryResult<Option<Vec<PathBuf>>> {
        let dir = &self.config.media_dir;
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(DeliveryError::Io {
                    source,
                    path: dir.clone(),
                })
            }
        };
        let mut media = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(DeliveryError::Io {
                        source,
                        path: dir.clone(),
                    })
                }
            };
            let is_file = entry
                .file_type()
                .await
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            let path = entry.path();
            if is_file && self.is_media(&path) {
                media.push(path);
            }
        }
        media.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(Some(media))
    }

    fn is_media(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.config.media_extensions.iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }
}

/// Cuts the caption to at most `max_chars` characters.
pub fn truncate_caption(caption: &str, max_chars: usize) -> String {
    if max_chars == 0 || caption.chars().count() <= max_chars {
        return caption.to_string();
    }
    caption.chars().take(max_chars).collect()
}
