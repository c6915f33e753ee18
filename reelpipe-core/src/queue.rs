//! Flat-file queue of pending post identifiers.
//!
//! One identifier per line. Discovery appends, retrieval reads the whole file
//! and truncates it at the end of its pass. The file is assumed to have a
//! single writer at a time; there is no locking.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue io error at {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
}

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Clone)]
pub struct QueueFile {
    path: PathBuf,
}

impl QueueFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pending identifiers in file order. A missing file reads as empty.
    pub async fn read(&self) -> QueueResult<Vec<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(parse_lines(&contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(QueueError::Io {
                source,
                path: self.path.clone(),
            }),
        }
    }

    /// Appends identifiers not already pending. Returns how many were written.
    pub async fn append<I, S>(&self, identifiers: I) -> QueueResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut pending: HashSet<String> = self.read().await?.into_iter().collect();
        let mut buffer = String::new();
        let mut written = 0usize;
        for identifier in identifiers {
            let identifier = identifier.as_ref().trim();
            if identifier.is_empty() || !pending.insert(identifier.to_string()) {
                continue;
            }
            buffer.push_str(identifier);
            buffer.push('\n');
            written += 1;
        }
        if written == 0 {
            return Ok(0);
        }
        self.ensure_parent().await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| self.io_error(source))?;
        file.write_all(buffer.as_bytes())
            .await
            .map_err(|source| self.io_error(source))?;
        file.flush().await.map_err(|source| self.io_error(source))?;
        Ok(written)
    }

    /// Truncates the queue to zero length, creating it if needed.
    pub async fn clear(&self) -> QueueResult<()> {
        self.ensure_parent().await?;
        fs::write(&self.path, b"")
            .await
            .map_err(|source| self.io_error(source))
    }

    async fn ensure_parent(&self) -> QueueResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|source| QueueError::Io {
                        source,
                        path: parent.to_path_buf(),
                    })?;
            }
        }
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> QueueError {
        QueueError::Io {
            source,
            path: self.path.clone(),
        }
    }
}

/// Append-only record of identifiers abandoned after exhausting their retries.
#[derive(Debug, Clone)]
pub struct DeadLetterLog {
    path: PathBuf,
}

impl DeadLetterLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, identifier: &str, reason: &str) -> QueueResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|source| QueueError::Io {
                        source,
                        path: parent.to_path_buf(),
                    })?;
            }
        }
        let line = format!(
            "{}\t{}\t{}\n",
            Utc::now().to_rfc3339(),
            identifier,
            reason.replace(['\n', '\t'], " ")
        );
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| QueueError::Io {
                source,
                path: self.path.clone(),
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|source| QueueError::Io {
                source,
                path: self.path.clone(),
            })
    }
}

fn parse_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
