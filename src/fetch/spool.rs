//! Memory/disk spooling for fetched bodies
//!
//! A [`Spool`] receives the body while it streams in. Once the copy is complete it
//! is finalized into a read-only [`SpoolBuffer`]. Disk spools live in private
//! temporary files that are deleted when their handle is dropped, so a body that
//! fails halfway never leaves anything behind.

use std::{
    io,
    path::{Path, PathBuf},
};
use tempfile::TempPath;
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncWriteExt, BufWriter},
};
use tracing::{debug, trace};

use super::models::BufferKind;

/// Write buffer size used when spooling to disk
const SPOOL_CHUNK_SIZE: usize = 64 * 1024;

/// Reader over a finalized buffer, positioned at byte zero
pub type BufferReader<'a> = Box<dyn AsyncRead + Send + Unpin + 'a>;

/// A body that is still being written
#[derive(Debug)]
pub enum Spool {
    Memory(Vec<u8>),
    Disk {
        writer: BufWriter<File>,
        path: TempPath,
        written: u64,
    },
}

impl Spool {
    /// Pick storage for a body of the given declared length
    ///
    /// Only a known length above `threshold` goes to disk; unknown lengths stay in
    /// memory.
    pub fn for_length(
        declared: Option<u64>,
        threshold: u64,
        spool_dir: Option<&Path>,
    ) -> io::Result<Self> {
        match declared {
            Some(len) if len > threshold => {
                let dir = spool_dir
                    .map(Path::to_path_buf)
                    .unwrap_or_else(std::env::temp_dir);
                let file = tempfile::Builder::new()
                    .prefix(".urlpack-")
                    .suffix(".part")
                    .tempfile_in(&dir)?;
                let (file, path) = file.into_parts();
                debug!(bytes = len, threshold, path = ?path, "Spooling to disk");
                Ok(Self::Disk {
                    writer: BufWriter::with_capacity(SPOOL_CHUNK_SIZE, File::from_std(file)),
                    path,
                    written: 0,
                })
            }
            _ => {
                debug!(bytes = ?declared, threshold, "Spooling to memory");
                let capacity = declared.unwrap_or(0).min(threshold) as usize;
                Ok(Self::Memory(Vec::with_capacity(capacity)))
            }
        }
    }

    pub fn kind(&self) -> BufferKind {
        match self {
            Self::Memory(_) => BufferKind::Memory,
            Self::Disk { .. } => BufferKind::Disk,
        }
    }

    /// Bytes accepted so far
    pub fn len(&self) -> u64 {
        match self {
            Self::Memory(bytes) => bytes.len() as u64,
            Self::Disk { written, .. } => *written,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            Self::Memory(bytes) => bytes.extend_from_slice(chunk),
            Self::Disk {
                writer, written, ..
            } => {
                writer.write_all(chunk).await?;
                *written += chunk.len() as u64;
            }
        }
        trace!(bytes = self.len(), chunk_size = chunk.len(), "Spooled chunk");
        Ok(())
    }

    /// Flush everything and hand back a readable buffer
    pub async fn finish(self) -> io::Result<SpoolBuffer> {
        match self {
            Self::Memory(bytes) => Ok(SpoolBuffer::Memory(bytes)),
            Self::Disk {
                mut writer,
                path,
                written,
            } => {
                writer.flush().await?;
                writer.shutdown().await?;
                drop(writer);
                Ok(SpoolBuffer::Disk { path, len: written })
            }
        }
    }

    /// Throw away a partial body, deleting its temp file if there is one
    pub fn discard(self) {
        if let Self::Disk { writer, path, .. } = self {
            drop(writer);
            let spool_path = path.to_path_buf();
            if let Err(e) = path.close() {
                debug!(error = %e, path = ?spool_path, "Failed to remove partial spool file");
            }
        }
    }
}

/// A complete body, exclusively owned by its fetch unit
#[derive(Debug)]
pub enum SpoolBuffer {
    Memory(Vec<u8>),
    Disk { path: TempPath, len: u64 },
}

impl SpoolBuffer {
    pub fn kind(&self) -> BufferKind {
        match self {
            Self::Memory(_) => BufferKind::Memory,
            Self::Disk { .. } => BufferKind::Disk,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            Self::Memory(bytes) => bytes.len() as u64,
            Self::Disk { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Location of the backing temp file, for disk buffers
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Memory(_) => None,
            Self::Disk { path, .. } => Some(&**path),
        }
    }

    /// Open a fresh reader from position zero
    pub async fn open(&self) -> io::Result<BufferReader<'_>> {
        match self {
            Self::Memory(bytes) => Ok(Box::new(bytes.as_slice())),
            Self::Disk { path, .. } => {
                let file = File::open(&**path).await?;
                Ok(Box::new(file))
            }
        }
    }

    /// Release the buffer now, reporting a failed temp file deletion
    pub fn release(self) -> io::Result<()> {
        match self {
            Self::Memory(_) => Ok(()),
            Self::Disk { path, .. } => {
                let spool_path: PathBuf = path.to_path_buf();
                path.close()?;
                trace!(path = ?spool_path, "Removed spool file");
                Ok(())
            }
        }
    }
}
