//! Storage locations and glob patterns

use crate::error::{Error, Result};
use object_store::path::Path as ObjectPath;
use regex::Regex;
use std::fmt;

/// Characters that turn a path segment into a glob pattern
const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

/// Storage backend of a location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// AWS S3 (`s3://`, `s3a://`, `s3n://`)
    S3,
    /// Cloudflare R2 (S3-compatible, custom endpoint)
    R2,
    /// Local filesystem
    Local,
}

impl Scheme {
    /// Whether this scheme talks to a remote service
    pub fn is_remote(self) -> bool {
        !matches!(self, Scheme::Local)
    }
}

/// A parsed input or output location
///
/// The key never starts or ends with `/`. For local locations it is the
/// absolute filesystem path without its leading slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    scheme: Scheme,
    bucket: Option<String>,
    key: String,
    raw: String,
}

impl Location {
    /// Parse a location URL or local path
    ///
    /// Supported formats:
    /// - `s3://bucket/path/`, `s3a://...`, `s3n://...` - AWS S3
    /// - `r2://bucket/path/` - Cloudflare R2
    /// - `file:///abs/path`, `/abs/path`, `rel/path` - local filesystem
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::invalid_location(url, "location is empty"));
        }

        for (prefix, scheme) in [
            ("s3://", Scheme::S3),
            ("s3a://", Scheme::S3),
            ("s3n://", Scheme::S3),
            ("r2://", Scheme::R2),
        ] {
            if let Some(rest) = url.strip_prefix(prefix) {
                return Self::parse_bucket(url, rest, scheme);
            }
        }

        if let Some(path) = url.strip_prefix("file://") {
            return Self::parse_local(url, path);
        }

        if let Some((scheme, _)) = url.split_once("://") {
            return Err(Error::invalid_location(
                url,
                format!("unsupported scheme '{scheme}'"),
            ));
        }

        Self::parse_local(url, url)
    }

    fn parse_bucket(raw: &str, rest: &str, scheme: Scheme) -> Result<Self> {
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(Error::invalid_location(raw, "missing bucket name"));
        }
        if bucket.contains(GLOB_CHARS) {
            return Err(Error::invalid_location(raw, "bucket name cannot be a pattern"));
        }

        Ok(Self {
            scheme,
            bucket: Some(bucket.to_string()),
            key: key.trim_matches('/').to_string(),
            raw: raw.to_string(),
        })
    }

    fn parse_local(raw: &str, path: &str) -> Result<Self> {
        let path = std::path::Path::new(path);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| Error::invalid_location(raw, format!("no working directory: {e}")))?
                .join(path)
        };

        let key = absolute
            .to_str()
            .ok_or_else(|| Error::invalid_location(raw, "path is not valid UTF-8"))?
            .trim_matches('/')
            .to_string();

        Ok(Self {
            scheme: Scheme::Local,
            bucket: None,
            key,
            raw: raw.to_string(),
        })
    }

    /// Storage backend
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Bucket name for remote locations
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// Key within the bucket (or absolute local path without leading slash)
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The location as originally written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether any path segment is a glob pattern
    pub fn has_glob(&self) -> bool {
        self.key.contains(GLOB_CHARS)
    }

    /// A child location one or more segments below this one
    #[must_use]
    pub fn join(&self, child: &str) -> Location {
        let child = child.trim_matches('/');
        let key = if self.key.is_empty() {
            child.to_string()
        } else {
            format!("{}/{child}", self.key)
        };
        Location {
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            key,
            raw: format!("{}/{child}", self.raw.trim_end_matches('/')),
        }
    }

    /// Object path of this location
    pub fn object_path(&self) -> ObjectPath {
        ObjectPath::from(self.key.as_str())
    }

    /// Object path of an already-escaped relative path below this location
    pub fn child_path(&self, relative: &str) -> Result<ObjectPath> {
        let relative = relative.trim_matches('/');
        let full = if self.key.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{relative}", self.key)
        };
        Ok(ObjectPath::parse(full)?)
    }

    /// Longest leading run of segments free of glob characters
    pub fn literal_prefix(&self) -> String {
        self.key
            .split('/')
            .take_while(|seg| !seg.contains(GLOB_CHARS))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Regex matching object keys selected by this location's glob
    ///
    /// Returns `None` for literal locations. A pattern that selects a
    /// directory also selects every object below it.
    pub fn glob_regex(&self) -> Result<Option<Regex>> {
        if !self.has_glob() {
            return Ok(None);
        }

        let mut pattern = String::from("^");
        for (i, segment) in self.key.split('/').enumerate() {
            if i > 0 {
                pattern.push('/');
            }
            if segment.contains(GLOB_CHARS) {
                pattern.push_str(&glob_segment_to_regex(segment).map_err(|message| {
                    Error::invalid_location(&self.raw, message)
                })?);
            } else {
                pattern.push_str(&regex::escape(segment));
            }
        }
        pattern.push_str("(?:/.*)?$");

        Regex::new(&pattern)
            .map(Some)
            .map_err(|e| Error::invalid_location(&self.raw, format!("invalid pattern: {e}")))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Translate one Hadoop-style glob segment into a regex fragment
///
/// Supports `*`, `?`, `[abc]`, `[!abc]`, `{a,b}` and `\` escapes.
fn glob_segment_to_regex(segment: &str) -> std::result::Result<String, String> {
    let mut out = String::new();
    let mut chars = segment.chars().peekable();
    let mut brace_depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| format!("dangling escape in '{segment}'"))?;
                out.push_str(&regex::escape(&escaped.to_string()));
            }
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!' | '^')) {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if matches!(c, '\\' | '[' | '&' | '~') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                if !closed {
                    return Err(format!("unterminated character class in '{segment}'"));
                }
                out.push(']');
            }
            '{' => {
                brace_depth += 1;
                out.push_str("(?:");
            }
            ',' if brace_depth > 0 => out.push('|'),
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                out.push(')');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    if brace_depth > 0 {
        return Err(format!("unterminated alternation in '{segment}'"));
    }
    Ok(out)
}
