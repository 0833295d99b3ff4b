//! Module for fetching remote resources into owned buffers
//!
//! This module provides the per-URL fetch unit, the HTTP client it runs on,
//! and the spool that decides between memory and disk storage.

mod http;
mod models;
mod spool;
mod unit;

use reqwest::StatusCode;
use thiserror::Error;

// Re-export the public API
pub use http::{Fetched, Fetcher};
pub use models::{BufferKind, DEFAULT_BUFFER_THRESHOLD, SourceItem, file_name_from_url};
pub use spool::{BufferReader, Spool, SpoolBuffer};
pub use unit::{Completed, FetchOutcome, FetchState, FetchUnit};

/// Errors that end a single fetch
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Request error: {0}")]
    Request(#[source] reqwest::Error),

    #[error("HTTP error: {} {}", .status.as_u16(), .status.canonical_reason().unwrap_or("Unknown"))]
    Status { status: StatusCode },

    #[error("Too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },

    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),

    #[error("Download stream error: {0}")]
    Stream(#[source] reqwest::Error),

    #[error("Spool error: {0}")]
    Spool(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;
