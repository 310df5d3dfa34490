//! Storage credentials
//!
//! Reads the access key pair from a local key-value file such as `dl.cfg`:
//!
//! ```text
//! [AWS]
//! AWS_ACCESS_KEY_ID = AKIA...
//! AWS_SECRET_ACCESS_KEY = ...
//! ```
//!
//! Section headers are optional and keys are matched case-insensitively in
//! any section. The values are handed to the session explicitly; nothing is
//! written to the process environment.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Key holding the access key id
pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// Key holding the secret access key
pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// Optional key holding a session token
pub const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

static SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[\s*([^\]]+?)\s*\]$").expect("valid section regex"));

static ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_.\-]+)\s*[=:]\s*(.*)$").expect("valid entry regex")
});

/// Access key pair for S3-compatible storage
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl Credentials {
    /// Create credentials from a key pair
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Load credentials from a key-value file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::credentials(format!("credentials file '{}' not found", path.display()))
            } else {
                Error::credentials(format!(
                    "failed to read credentials file '{}': {e}",
                    path.display()
                ))
            }
        })?;
        Self::parse(&content).map_err(|e| match e {
            Error::Credentials { message } => {
                Error::credentials(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Parse credentials from key-value text
    pub fn parse(content: &str) -> Result<Self> {
        let entries = parse_entries(content);

        let lookup = |key: &str| -> Result<String> {
            entries
                .get(&key.to_lowercase())
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| Error::credentials(format!("missing required key {key}")))
        };

        let mut credentials = Self::new(lookup(ACCESS_KEY_ID)?, lookup(SECRET_ACCESS_KEY)?);
        if let Ok(token) = lookup(SESSION_TOKEN) {
            credentials = credentials.with_session_token(token);
        }
        Ok(credentials)
    }

    /// Access key id
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Secret access key
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    /// Session token, if any
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"****")
            .field("session_token", &self.session_token.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Flatten all `key = value` entries; later sections win on duplicates
fn parse_entries(content: &str) -> HashMap<String, String> {
    let mut entries = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if SECTION_RE.is_match(line) {
            continue;
        }
        if let Some(caps) = ENTRY_RE.captures(line) {
            let key = caps[1].to_lowercase();
            let value = unquote(caps[2].trim());
            entries.insert(key, value.to_string());
        }
    }

    entries
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
