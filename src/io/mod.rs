//! Backing filesystems and the random-access reader trait.
//!
//! The archive filesystem never touches storage directly. It asks a
//! [`BackingFs`] to stat and open the archive file, and it reads the archive
//! through [`ReadAt`], which works the same for a local file, a byte buffer or
//! a remote object fetched with HTTP Range requests.

mod http;
mod local;
mod memory;

pub use http::{HttpFs, HttpRangeReader};
pub use local::{LocalFileReader, LocalFs};
pub use memory::{MemoryFs, MemoryReader};

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill the whole buffer starting at `offset`, failing on a short source.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .read_at(offset + filled as u64, &mut buf[filled..])
                .await?;
            if n == 0 {
                bail!(
                    "Unexpected end of data: wanted {} bytes at offset {}, got {}",
                    buf.len(),
                    offset,
                    filled
                );
            }
            filled += n;
        }
        Ok(())
    }

    /// Release the underlying resource. Reads after close fail.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Result of a stat on the backing filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackingStat {
    pub size: u64,
    pub is_dir: bool,
}

/// Handle returned by [`BackingFs::open`].
///
/// Some sources can only be streamed front to back. Those come back as
/// `Sequential`, and the archive filesystem refuses them because the central
/// directory sits at the end of the file.
pub enum BackingFile {
    RandomAccess(Arc<dyn ReadAt>),
    Sequential(Box<dyn AsyncRead + Send + Unpin>),
}

impl std::fmt::Debug for BackingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackingFile::RandomAccess(reader) => f
                .debug_struct("RandomAccess")
                .field("size", &reader.size())
                .finish(),
            BackingFile::Sequential(_) => f.write_str("Sequential"),
        }
    }
}

/// A filesystem that can hold archive files.
///
/// Paths are relative and forward-slash separated. A missing path is reported
/// as [`std::io::ErrorKind::NotFound`].
#[async_trait]
pub trait BackingFs: Send + Sync {
    async fn stat(&self, path: &str) -> std::io::Result<BackingStat>;

    async fn open(&self, path: &str) -> std::io::Result<BackingFile>;
}

#[async_trait]
impl<T: BackingFs + ?Sized> BackingFs for Arc<T> {
    async fn stat(&self, path: &str) -> std::io::Result<BackingStat> {
        (**self).stat(path).await
    }

    async fn open(&self, path: &str) -> std::io::Result<BackingFile> {
        (**self).open(path).await
    }
}
