use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    pub paths: PathsSection,
    pub discovery: DiscoverySection,
    pub browser: BrowserSection,
    pub login: LoginSection,
    pub retrieval: RetrievalSection,
    pub delivery: DeliverySection,
}

impl PipelineConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    pub fn queue_file(&self) -> PathBuf {
        self.resolve_path(&self.paths.queue_file)
    }

    pub fn session_file(&self) -> PathBuf {
        self.resolve_path(&self.paths.session_file)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.media_dir)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.staging_dir)
    }

    pub fn dead_letter_file(&self) -> Option<PathBuf> {
        self.paths
            .dead_letter_file
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(|value| self.resolve_path(value))
    }

    /// Overrides `paths.base_dir`, against which every relative path resolves.
    pub fn with_base_dir<P: AsRef<Path>>(mut self, base_dir: P) -> Self {
        self.paths.base_dir = base_dir.as_ref().to_string_lossy().to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.max_retries == 0 {
            return Err(ConfigError::Invalid {
                field: "retrieval.max_retries",
                reason: "must be greater than zero".into(),
            });
        }
        if self.retrieval.max_name_length <= 4 {
            return Err(ConfigError::Invalid {
                field: "retrieval.max_name_length",
                reason: "must leave room for the extension".into(),
            });
        }
        if self.discovery.max_total_scrolls == 0 {
            return Err(ConfigError::Invalid {
                field: "discovery.max_total_scrolls",
                reason: "must be greater than zero".into(),
            });
        }
        regex::Regex::new(&self.discovery.post_pattern).map_err(|err| ConfigError::Invalid {
            field: "discovery.post_pattern",
            reason: err.to_string(),
        })?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub queue_file: String,
    pub session_file: String,
    pub media_dir: String,
    pub staging_dir: String,
    #[serde(default)]
    pub dead_letter_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySection {
    pub target_count: usize,
    pub target_jitter: usize,
    pub feed_url: String,
    pub post_pattern: String,
    pub max_consecutive_misses: usize,
    pub max_total_scrolls: usize,
    pub initial_wait_ms: [u64; 2],
    pub watch_time_ms: [u64; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSection {
    pub executable_path: String,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub request_timeout_seconds: Option<u64>,
    pub window: [u32; 2],
    pub user_agent: Option<String>,
    pub lang: Option<String>,
    pub disable_automation_controlled: bool,
    pub disable_notifications: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginSection {
    pub home_url: String,
    pub logged_in_selector: String,
    pub wait_timeout_seconds: u64,
    pub settle_ms: [u64; 2],
    pub typing_delay_ms: [u64; 2],
    pub login_button_labels: Vec<String>,
    pub dismiss_labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidecarContent {
    SourceUrl,
    Caption,
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSection {
    pub api_base: String,
    pub app_id: String,
    pub user_agent: String,
    pub request_timeout_seconds: u64,
    pub max_retries: u32,
    pub backoff_seconds: [u64; 2],
    pub caption_words: usize,
    pub max_name_length: usize,
    pub media_extension: String,
    pub sidecar: SidecarContent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliverySection {
    pub api_base: String,
    pub request_timeout_seconds: u64,
    pub pause_ms: u64,
    pub fallback_caption: String,
    pub media_extensions: Vec<String>,
    pub max_caption_chars: usize,
}

/// Secrets supplied by the environment, never by the TOML file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub instagram_username: Option<String>,
    pub instagram_password: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub reels_to_collect: Option<usize>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            instagram_username: read("INSTAGRAM_USERNAME"),
            instagram_password: read("INSTAGRAM_PASSWORD"),
            telegram_bot_token: read("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: read("TELEGRAM_CHAT_ID"),
            reels_to_collect: read("REELS_TO_COLLECT").and_then(|value| value.parse().ok()),
        }
    }

    pub fn instagram_login(&self) -> Result<(String, String)> {
        let username = self
            .instagram_username
            .clone()
            .ok_or(ConfigError::MissingCredential("INSTAGRAM_USERNAME"))?;
        let password = self
            .instagram_password
            .clone()
            .ok_or(ConfigError::MissingCredential("INSTAGRAM_PASSWORD"))?;
        Ok((username, password))
    }

    pub fn telegram(&self) -> Result<(String, String)> {
        let token = self
            .telegram_bot_token
            .clone()
            .ok_or(ConfigError::MissingCredential("TELEGRAM_BOT_TOKEN"))?;
        let chat_id = self
            .telegram_chat_id
            .clone()
            .ok_or(ConfigError::MissingCredential("TELEGRAM_CHAT_ID"))?;
        Ok((token, chat_id))
    }
}

pub fn load_pipeline_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let config: PipelineConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
