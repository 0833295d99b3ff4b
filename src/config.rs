//! Config module for urlpack

use std::{path::PathBuf, time::Duration};

use bytesize::ByteSize;
use clap::Parser;

use crate::archive::{self, ArchiveError, Archiver, Compression, DEFAULT_MAX_PARALLEL};
use crate::fetch::SourceItem;

#[derive(Parser, Debug, Clone)]
#[clap(name = "urlpack", version, about = "Fetch URLs concurrently and pack them into a zip archive")]
pub struct Config {
    /// URLs to fetch
    pub urls: Vec<String>,

    /// File with one `URL [NAME]` per line; blank lines and `#` comments are skipped
    #[clap(short, long, env = "URLPACK_INPUT")]
    pub input: Option<PathBuf>,

    /// Path of the archive to write
    #[clap(short, long, env = "URLPACK_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Maximum number of fetches in flight at once
    #[clap(short = 'j', long, env = "URLPACK_MAX_PARALLEL", default_value_t = DEFAULT_MAX_PARALLEL)]
    pub max_parallel: usize,

    /// Bodies declared larger than this are spooled to disk instead of memory
    #[clap(long, env = "URLPACK_BUFFER_THRESHOLD", default_value = "100 MiB")]
    pub buffer_threshold: ByteSize,

    /// Abort the whole run on the first failed fetch
    #[clap(long, env = "URLPACK_FAIL_FAST", default_value = "false")]
    pub fail_fast: bool,

    #[clap(long, env = "URLPACK_MAX_REDIRECTS", default_value_t = 10)]
    pub max_redirects: usize,

    /// Per-request timeout in seconds
    #[clap(long = "timeout", env = "URLPACK_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Directory for disk spools, defaults to the system temp dir
    #[clap(long, env = "URLPACK_SPOOL_DIR")]
    pub spool_dir: Option<PathBuf>,

    #[clap(long, env = "URLPACK_COMPRESSION", value_enum, default_value = "deflate")]
    pub compression: Compression,

    /// Print the run report as JSON
    #[clap(long, env = "URLPACK_JSON", default_value = "false")]
    pub json: bool,
}

impl Config {
    /// Positional URLs followed by the entries of the input file, if any
    pub async fn source_items(&self) -> std::io::Result<Vec<SourceItem>> {
        let mut items: Vec<SourceItem> = self.urls.iter().map(SourceItem::new).collect();

        if let Some(input) = &self.input {
            let contents = tokio::fs::read_to_string(input).await?;
            items.extend(contents.lines().filter_map(SourceItem::parse_line));
        }

        Ok(items)
    }

    /// Check the usage preconditions of a run, returning the output path
    pub fn validate(&self, items: &[SourceItem]) -> archive::Result<PathBuf> {
        if items.is_empty() {
            return Err(ArchiveError::NoItems);
        }
        self.output.clone().ok_or(ArchiveError::NoOutput)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// An empty archiver with every option applied
    pub fn archiver(&self) -> Archiver {
        let mut archiver = Archiver::new()
            .with_max_parallel(self.max_parallel)
            .with_buffer_threshold(self.buffer_threshold.as_u64())
            .with_fail_fast(self.fail_fast)
            .with_max_redirects(self.max_redirects)
            .with_compression(self.compression);

        if let Some(timeout) = self.timeout() {
            archiver = archiver.with_timeout(timeout);
        }
        if let Some(dir) = &self.spool_dir {
            archiver = archiver.with_spool_dir(dir);
        }
        archiver
    }
}

pub fn config() -> Config {
    Config::parse()
}
