use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical reference to one post: its normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    /// Wraps an already-normalized identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_location(raw: &str) -> Self {
        Self(normalize_location(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, e.g. `C1a2b3` for `https://www.instagram.com/reels/C1a2b3`.
    pub fn shortcode(&self) -> &str {
        shortcode(&self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PostId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Drops the query string, then trailing `/` and `#` characters.
pub fn normalize_location(raw: &str) -> String {
    let without_query = raw.trim().split('?').next().unwrap_or_default();
    without_query.trim_end_matches(['/', '#']).to_string()
}

pub fn shortcode(identifier: &str) -> &str {
    identifier
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(identifier)
}
