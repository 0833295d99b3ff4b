//! Archive writers
//!
//! [`ArchiveWriter`] is the seam between the archiver and the container format.
//! Entries are written strictly one after another. [`ZipArchiveWriter`] is the
//! zip implementation over any tokio `AsyncWrite` sink.

use async_zip::{ZipEntryBuilder, tokio::write::ZipFileWriter};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::compat::FuturesAsyncWriteCompatExt;
use tracing::{debug, trace};

use super::{ArchiveError, Result};

/// Receives named byte streams and serializes them into one archive
///
/// The archive phase runs on the caller's task, so the returned futures carry no `Send` bound.
#[allow(async_fn_in_trait)]
pub trait ArchiveWriter {
    /// Copy `reader` to its end into a new entry called `name`; returns the bytes copied
    async fn add_entry<R>(&mut self, name: &str, reader: R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send;

    /// Write the trailing archive structures and flush the sink
    async fn finish(&mut self) -> Result<()>;
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Stored,
    #[default]
    Deflate,
}

impl From<Compression> for async_zip::Compression {
    fn from(compression: Compression) -> Self {
        match compression {
            Compression::Stored => async_zip::Compression::Stored,
            Compression::Deflate => async_zip::Compression::Deflate,
        }
    }
}

/// Zip container over a tokio sink
pub struct ZipArchiveWriter<W: AsyncWrite + Unpin> {
    inner: Option<ZipFileWriter<W>>,
    compression: Compression,
    entries: usize,
}

impl<W: AsyncWrite + Unpin> ZipArchiveWriter<W> {
    pub fn new(sink: W, compression: Compression) -> Self {
        Self {
            inner: Some(ZipFileWriter::with_tokio(sink)),
            compression,
            entries: 0,
        }
    }

    /// Number of entries written so far
    pub fn entries(&self) -> usize {
        self.entries
    }
}

impl<W: AsyncWrite + Unpin> ArchiveWriter for ZipArchiveWriter<W> {
    async fn add_entry<R>(&mut self, name: &str, mut reader: R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let writer = self.inner.as_mut().ok_or(ArchiveError::Finished)?;

        let builder = ZipEntryBuilder::new(name.to_string().into(), self.compression.into());
        let mut entry = writer.write_entry_stream(builder).await?.compat_write();
        let bytes = tokio::io::copy(&mut reader, &mut entry).await?;
        entry.into_inner().close().await?;

        self.entries += 1;
        trace!(name, bytes, "Wrote zip entry");
        Ok(bytes)
    }

    async fn finish(&mut self) -> Result<()> {
        let writer = self.inner.take().ok_or(ArchiveError::Finished)?;
        let mut sink = writer.close().await?.into_inner();
        sink.flush().await?;
        sink.shutdown().await?;
        debug!(entries = self.entries, "Zip archive finalized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_zip::tokio::read::seek::ZipFileReader;
    use std::io::Cursor;
    use tokio_util::compat::FuturesAsyncReadCompatExt;

    #[tokio::test]
    async fn test_zip_round_trip() {
        let mut out = Vec::new();
        let mut writer = ZipArchiveWriter::new(&mut out, Compression::Deflate);
        writer.add_entry("a.txt", &b"alpha"[..]).await.unwrap();
        writer
            .add_entry("b.bin", &vec![0u8; 10_000][..])
            .await
            .unwrap();
        assert_eq!(writer.entries(), 2);
        writer.finish().await.unwrap();
        drop(writer);

        let mut zip = ZipFileReader::with_tokio(Cursor::new(out)).await.unwrap();
        let names: Vec<String> = zip
            .file()
            .entries()
            .iter()
            .map(|e| e.filename().as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a.txt", "b.bin"]);

        let mut content = Vec::new();
        let reader = zip.reader_with_entry(0).await.unwrap();
        tokio::io::copy(&mut reader.compat(), &mut content)
            .await
            .unwrap();
        assert_eq!(content, b"alpha");
    }

    #[tokio::test]
    async fn test_stored_empty_archive() {
        let mut out = Vec::new();
        let mut writer = ZipArchiveWriter::new(&mut out, Compression::Stored);
        writer.finish().await.unwrap();
        drop(writer);

        let zip = ZipFileReader::with_tokio(Cursor::new(out)).await.unwrap();
        assert!(zip.file().entries().is_empty());
    }

    #[tokio::test]
    async fn test_write_after_finish_fails() {
        let mut out = Vec::new();
        let mut writer = ZipArchiveWriter::new(&mut out, Compression::Stored);
        writer.finish().await.unwrap();

        let err = writer.add_entry("late.txt", &b"x"[..]).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Finished));
    }
}
