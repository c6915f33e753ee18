use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tokio::fs;
use tracing::debug;

use crate::config::DeliverySection;

use super::error::{DeliveryError, DeliveryResult};
use super::MessagingClient;

/// Bot API client posting videos to a single chat.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(config: &DeliverySection, token: &str, chat_id: &str) -> DeliveryResult<Self> {
        if token.trim().is_empty() {
            return Err(DeliveryError::Configuration(
                "telegram bot token is empty".to_string(),
            ));
        }
        if chat_id.trim().is_empty() {
            return Err(DeliveryError::Configuration(
                "telegram chat id is empty".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            endpoint: send_video_endpoint(&config.api_base, token),
            chat_id: chat_id.trim().to_string(),
        })
    }
}

#[async_trait]
impl MessagingClient for TelegramClient {
    fn destination(&self) -> &str {
        &self.chat_id
    }

    async fn send_media(&self, path: &Path, caption: &str) -> DeliveryResult<()> {
        let bytes = fs::read(path).await.map_err(|source| DeliveryError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "video.mp4".to_string());
        debug!(file = %file_name, size = bytes.len(), "uploading video");
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("video/mp4")?;
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part("video", part);

        let resp = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        Ok(())
    }
}

fn send_video_endpoint(api_base: &str, token: &str) -> String {
    format!("{}/bot{}/sendVideo", api_base.trim_end_matches('/'), token.trim())
}
