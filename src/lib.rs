//! Fetch a set of remote resources concurrently and pack them into one archive.
//!
//! Each URL becomes a [`FetchUnit`] that spools its body into memory or, above a
//! size threshold, into a private temp file. The [`Archiver`] runs the units
//! through a bounded pool, records which succeeded and which failed, and writes
//! the succeeded ones into a zip archive under unique entry names.
//!
//! ```no_run
//! # async fn run() -> urlpack::archive::Result<()> {
//! let mut archiver = urlpack::Archiver::new().with_max_parallel(4);
//! archiver.add_item("https://example.com/report.csv");
//! archiver.add_item(urlpack::SourceItem::new("https://example.com/dl?id=7").with_name("data.json"));
//!
//! let file = tokio::fs::File::create("bundle.zip").await?;
//! let report = archiver.create_archive(file).await?;
//! print!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod fetch;

pub use archive::{ArchiveError, Archiver, FailedItem, RunReport, SucceededItem};
pub use fetch::{FetchError, FetchUnit, Fetcher, SourceItem};
