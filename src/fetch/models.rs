//! Data structures for the fetch stage
//!
//! This file contains the input types accepted by the archiver and the helpers
//! used to derive an entry name from a response location.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Size above which a response with a declared length is spooled to disk (100 MiB)
pub const DEFAULT_BUFFER_THRESHOLD: u64 = 100 * 1024 * 1024;

/// A resource to fetch, as handed to the archiver
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceItem {
    pub url: String,
    /// Explicit entry name; derived from the response location when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Per-item override of the archiver's buffer threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_threshold: Option<u64>,
}

impl SourceItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            buffer_threshold: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_buffer_threshold(mut self, threshold: u64) -> Self {
        self.buffer_threshold = Some(threshold);
        self
    }

    /// Parse one line of an input list: `URL [NAME]`
    ///
    /// Returns `None` for blank lines and `#` comments.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let mut parts = line.splitn(2, char::is_whitespace);
        let url = parts.next()?;
        let item = Self::new(url);
        match parts.next().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Some(item.with_name(name)),
            None => Some(item),
        }
    }
}

impl From<&str> for SourceItem {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for SourceItem {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl fmt::Display for SourceItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.url, name),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Which kind of storage holds a fetched body
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BufferKind {
    Memory,
    Disk,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
        }
    }
}

/// Basename of the URL path, percent-decoded
///
/// Returns an empty string when the path ends with `/` or has no segments,
/// mirroring a file name lookup on the path.
#[tracing::instrument(level = "trace", ret)]
pub fn file_name_from_url(url: &Url) -> String {
    let Some(last) = url.path_segments().and_then(|mut segments| segments.next_back()) else {
        return String::new();
    };

    match urlencoding::decode(last) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => last.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url() {
        let url = Url::parse("https://example.com/files/report.csv?x=1").unwrap();
        assert_eq!(file_name_from_url(&url), "report.csv");

        let url = Url::parse("https://example.com/files/my%20report.csv").unwrap();
        assert_eq!(file_name_from_url(&url), "my report.csv");

        let url = Url::parse("https://example.com/files/").unwrap();
        assert_eq!(file_name_from_url(&url), "");

        let url = Url::parse("https://example.com").unwrap();
        assert_eq!(file_name_from_url(&url), "");
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(SourceItem::parse_line("   "), None);
        assert_eq!(SourceItem::parse_line("# comment"), None);

        let item = SourceItem::parse_line("https://example.com/a.txt").unwrap();
        assert_eq!(item.url, "https://example.com/a.txt");
        assert!(item.name.is_none());

        let item = SourceItem::parse_line("https://example.com/a.txt  notes 2024.txt ").unwrap();
        assert_eq!(item.name.as_deref(), Some("notes 2024.txt"));
    }
}
