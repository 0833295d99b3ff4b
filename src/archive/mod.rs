//! Archive assembly
//!
//! The [`Archiver`] owns the fetch units of a run, drives them through a bounded
//! pool, and writes every succeeded body into an [`ArchiveWriter`] under a unique
//! name.

mod archiver;
mod naming;
mod writer;

use thiserror::Error;

use crate::fetch::FetchError;

pub use archiver::{Archiver, DEFAULT_MAX_PARALLEL, FailedItem, RunReport, SucceededItem};
pub use naming::{EntryNames, sanitize};
pub use writer::{ArchiveWriter, Compression, ZipArchiveWriter};

/// Errors that fail a whole run
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("No items to archive")]
    NoItems,

    #[error("No output configured for the archive")]
    NoOutput,

    #[error("Fetch of {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Fetch of {url} ended without a result")]
    Unfinished { url: String },

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Archive write error: {0}")]
    Write(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] async_zip::error::ZipError),

    #[error("Archive already finalized")]
    Finished,

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Fetch worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
