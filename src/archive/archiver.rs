//! Run orchestration
//!
//! A run has two sequential phases. First every unit is fetched through a pool
//! that admits units in insertion order, never more than `max_parallel` at once;
//! the loop that joins the pool is the only place outcomes are recorded. Then the
//! succeeded units are written into the archive in the order they completed.

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};
use tokio::{io::AsyncWrite, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use ulid::Ulid;

use super::naming::EntryNames;
use super::writer::{ArchiveWriter, Compression, ZipArchiveWriter};
use super::{ArchiveError, Result};
use crate::fetch::{
    BufferKind, Completed, DEFAULT_BUFFER_THRESHOLD, FetchOutcome, FetchUnit, Fetcher,
    SourceItem,
};

pub const DEFAULT_MAX_PARALLEL: usize = 2;

/// An item that made it into the archive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SucceededItem {
    pub id: Ulid,
    pub url: String,
    /// Entry name inside the archive, after sanitizing and deduplication
    pub name: String,
    pub bytes: u64,
    pub storage: BufferKind,
}

/// An item whose fetch failed, with the cause as text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedItem {
    pub id: Ulid,
    pub url: String,
    pub cause: String,
}

/// Classification of a finished run
///
/// Both lists are in completion order, which is also the entry order of the
/// archive for `succeeded`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReport {
    pub succeeded: Vec<SucceededItem>,
    pub failed: Vec<FailedItem>,
    /// Most fetches admitted at the same time during the run
    pub peak_in_flight: usize,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Succeeded:")?;
        for item in &self.succeeded {
            writeln!(f, "\t{}", item.url)?;
        }
        if !self.failed.is_empty() {
            writeln!(f, "Failed:")?;
            for item in &self.failed {
                writeln!(f, "\t{} - {}", item.url, item.cause)?;
            }
        }
        Ok(())
    }
}

/// Fetches a set of URLs and packs them into one archive
///
/// Items are added up front; [`Archiver::create_archive`] consumes the archiver,
/// so a run happens exactly once and every buffer is released when it returns,
/// whatever the outcome.
#[derive(Debug)]
pub struct Archiver {
    items: Vec<FetchUnit>,
    max_parallel: usize,
    buffer_threshold: u64,
    fail_fast: bool,
    max_redirects: usize,
    timeout: Option<Duration>,
    spool_dir: Option<PathBuf>,
    compression: Compression,
    fetcher: Option<Fetcher>,
    cancel_token: CancellationToken,
}

impl Default for Archiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Archiver {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            max_parallel: DEFAULT_MAX_PARALLEL,
            buffer_threshold: DEFAULT_BUFFER_THRESHOLD,
            fail_fast: false,
            max_redirects: 10,
            timeout: None,
            spool_dir: None,
            compression: Compression::default(),
            fetcher: None,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Concurrency bound; zero is treated as one
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Threshold given to items added from now on that don't carry their own
    pub fn with_buffer_threshold(mut self, threshold: u64) -> Self {
        self.buffer_threshold = threshold;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_spool_dir(mut self, spool_dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(spool_dir.into());
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Use a prepared fetcher instead of building one from the options above
    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Token that cancels the run when raised
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Queue a URL or structured item, returning the id of its fetch unit
    pub fn add_item(&mut self, item: impl Into<SourceItem>) -> Ulid {
        let unit = FetchUnit::from_item(item.into(), self.buffer_threshold);
        let id = unit.id();
        debug!(id = %id, url = %unit.url(), "Added item");
        self.items.push(unit);
        id
    }

    pub fn add_items<I>(&mut self, items: I)
    where
        I: IntoIterator,
        I::Item: Into<SourceItem>,
    {
        for item in items {
            self.add_item(item);
        }
    }

    pub fn items(&self) -> &[FetchUnit] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fetch every item and write a zip archive to `sink`
    pub async fn create_archive<W>(self, sink: W) -> Result<RunReport>
    where
        W: AsyncWrite + Unpin,
    {
        let mut writer = ZipArchiveWriter::new(sink, self.compression);
        self.create_archive_with(&mut writer).await
    }

    /// Fetch every item and write the succeeded ones through `writer`
    #[instrument(name = "create_archive", level = "info", skip_all, fields(items = self.items.len(), max_parallel = self.max_parallel, fail_fast = self.fail_fast))]
    pub async fn create_archive_with<A>(mut self, writer: &mut A) -> Result<RunReport>
    where
        A: ArchiveWriter,
    {
        if self.items.is_empty() {
            return Err(ArchiveError::NoItems);
        }

        let fetcher = self.build_fetcher()?;
        info!("Starting fetch phase");
        let (succeeded, failed, peak_in_flight) = self.fetch_all(fetcher).await?;

        info!(
            succeeded = succeeded.len(),
            failed = failed.len(),
            "Fetch phase complete, writing archive"
        );

        let mut names = EntryNames::new();
        let mut written = Vec::with_capacity(succeeded.len());
        for completed in &succeeded {
            if self.cancel_token.is_cancelled() {
                info!(written = written.len(), "Run cancelled while writing archive");
                return Err(ArchiveError::Cancelled);
            }

            let name = names.claim(&completed.name);
            let reader = completed.buffer.open().await?;
            let bytes = writer.add_entry(&name, reader).await?;
            info!(entry = %name, bytes, url = %completed.url, "Added archive entry");

            written.push(SucceededItem {
                id: completed.id,
                url: completed.url.clone(),
                name,
                bytes,
                storage: completed.buffer.kind(),
            });
        }

        writer.finish().await?;

        for completed in succeeded {
            let id = completed.id;
            if let Err(e) = completed.release() {
                warn!(id = %id, error = %e, "Failed to release buffer");
            }
        }

        info!(
            entries = written.len(),
            failed = failed.len(),
            "Archive complete"
        );
        Ok(RunReport {
            succeeded: written,
            failed,
            peak_in_flight,
        })
    }

    fn build_fetcher(&mut self) -> Result<Fetcher> {
        if let Some(fetcher) = self.fetcher.take() {
            return Ok(fetcher);
        }

        let mut fetcher = Fetcher::new(self.timeout)?.with_max_redirects(self.max_redirects);
        if let Some(dir) = &self.spool_dir {
            fetcher = fetcher.with_spool_dir(dir);
        }
        Ok(fetcher)
    }

    /// Drive all units to a terminal state and classify them as they finish
    async fn fetch_all(
        &mut self,
        fetcher: Fetcher,
    ) -> Result<(Vec<Completed>, Vec<FailedItem>, usize)> {
        let mut pending = std::mem::take(&mut self.items).into_iter();
        let mut in_flight = JoinSet::new();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut peak_in_flight = 0;

        loop {
            if self.cancel_token.is_cancelled() {
                return Err(abort(&mut in_flight).await);
            }

            while in_flight.len() < self.max_parallel {
                let Some(mut unit) = pending.next() else {
                    break;
                };
                debug!(id = %unit.id(), url = %unit.url(), "Admitting fetch");
                let fetcher = fetcher.clone();
                in_flight.spawn(async move {
                    unit.fetch(&fetcher).await;
                    unit
                });
            }
            peak_in_flight = peak_in_flight.max(in_flight.len());

            let joined = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    return Err(abort(&mut in_flight).await);
                }
                joined = in_flight.join_next() => joined,
            };

            // Nothing in flight and nothing left to admit
            let Some(joined) = joined else {
                break;
            };

            let fatal = match joined?.into_outcome() {
                FetchOutcome::Succeeded(completed) => {
                    succeeded.push(completed);
                    continue;
                }
                FetchOutcome::Failed { url, error, .. } if self.fail_fast => {
                    warn!(url = %url, error = %error, in_flight = in_flight.len(), "Fetch failed, aborting run");
                    ArchiveError::Fetch { url, source: error }
                }
                FetchOutcome::Failed { id, url, error } => {
                    failed.push(FailedItem {
                        id,
                        url,
                        cause: error.to_string(),
                    });
                    continue;
                }
                // A joined unit is always terminal
                FetchOutcome::Unfinished(unit) => ArchiveError::Unfinished {
                    url: unit.url().to_string(),
                },
            };

            drop(pending);
            while in_flight.join_next().await.is_some() {}
            return Err(fatal);
        }

        Ok((succeeded, failed, peak_in_flight))
    }
}

/// Interrupt every in-flight fetch and wait for the tasks to wind down
async fn abort(in_flight: &mut JoinSet<FetchUnit>) -> ArchiveError {
    info!(in_flight = in_flight.len(), "Run cancelled, aborting fetches");
    in_flight.shutdown().await;
    ArchiveError::Cancelled
}
