use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file {path} not found")]
    Missing { path: PathBuf },
    #[error("session io error at {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("session file {path} is not valid JSON: {source}")]
    Parse {
        source: serde_json::Error,
        path: PathBuf,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    /// Anything outside Strict/Lax/None is restored as Lax.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw {
            Some("Strict") => SameSite::Strict,
            Some("None") => SameSite::None,
            _ => SameSite::Lax,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// A persisted cookie. Field names follow the WebDriver cookie JSON layout so
/// existing cookie dumps load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

impl StoredCookie {
    pub fn same_site(&self) -> SameSite {
        SameSite::normalize(self.same_site.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub async fn load(&self) -> SessionResult<Vec<StoredCookie>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(SessionError::Missing {
                    path: self.path.clone(),
                })
            }
            Err(source) => {
                return Err(SessionError::Io {
                    source,
                    path: self.path.clone(),
                })
            }
        };
        serde_json::from_str(&contents).map_err(|source| SessionError::Parse {
            source,
            path: self.path.clone(),
        })
    }

    pub async fn save(&self, cookies: &[StoredCookie]) -> SessionResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|source| SessionError::Io {
                        source,
                        path: parent.to_path_buf(),
                    })?;
            }
        }
        let payload = serde_json::to_vec_pretty(cookies).map_err(|source| SessionError::Parse {
            source,
            path: self.path.clone(),
        })?;
        fs::write(&self.path, payload)
            .await
            .map_err(|source| SessionError::Io {
                source,
                path: self.path.clone(),
            })
    }

    /// `Cookie` header value for HTTP clients sharing the browser session.
    pub async fn cookie_header(&self) -> SessionResult<String> {
        let cookies = self.load().await?;
        Ok(cookie_header(&cookies))
    }
}

pub fn cookie_header(cookies: &[StoredCookie]) -> String {
    cookies
        .iter()
        .map(|cookie| format!("{}={}", cookie.name, cookie.value))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn cookie_value<'a>(cookies: &'a [StoredCookie], name: &str) -> Option<&'a str> {
    cookies
        .iter()
        .find(|cookie| cookie.name == name)
        .map(|cookie| cookie.value.as_str())
}
