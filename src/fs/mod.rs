//! Read-only filesystem view of a ZIP archive.
//!
//! [`ZipFs`] wraps a [`BackingFs`] and the path of an archive inside it.
//! Construction only stats the archive. The first request opens it, parses
//! the central directory and builds an index; every later request is answered
//! from that index.
//!
//! ```no_run
//! use std::sync::Arc;
//! use zipfs::{LocalFs, ZipFs};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let zfs = ZipFs::new(Arc::new(LocalFs::new("testdata")), "photos.zip").await?;
//! for entry in zfs.read_dir("2024/summer").await? {
//!     println!("{} {}", entry.name(), entry.info().size());
//! }
//! let mut data = Vec::new();
//! zfs.open("2024/summer/beach.jpg").await?.read_to_end(&mut data).await?;
//! zfs.close().await?;
//! # Ok(())
//! # }
//! ```

mod index;
mod info;

pub use info::{DirEntry, FileInfo, FileType};

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Result, ZipFsError};
use crate::io::{BackingFile, BackingFs};
use crate::path;
use crate::zip::{CompressionMethod, EntryReader, ZipParser};

use index::ArchiveIndex;

/// Parsed archive plus the reader it was parsed from.
struct OpenArchive {
    parser: ZipParser,
    index: ArchiveIndex,
}

enum State {
    Unopened,
    Opened(Arc<OpenArchive>),
    Closed,
}

/// A ZIP archive exposed as a read-only directory tree.
///
/// All paths are relative and forward-slash separated. They are cleaned
/// before lookup, so `a//b/./c.txt` and `/a/b/c.txt` both name `a/b/c.txt`;
/// the root can be written as `""`, `"."` or `"/"`.
///
/// The archive is opened on first use. Concurrent first callers wait for a
/// single open; if it fails, the handle is released and the next call tries
/// again. After [`close`](Self::close) every operation fails with
/// [`ZipFsError::ClosedHandle`].
pub struct ZipFs {
    backing: Arc<dyn BackingFs>,
    path: String,
    size: u64,
    state: Mutex<State>,
}

impl ZipFs {
    /// Prepare a filesystem over the archive at `path` in `backing`.
    ///
    /// Stats the archive but does not read it. Fails with `NotFound` when the
    /// path is missing and `InvalidArgument` when it is a directory.
    #[tracing::instrument(level = "debug", skip(backing))]
    pub async fn new(backing: Arc<dyn BackingFs>, path: &str) -> Result<Self> {
        const OP: &str = "new";
        let cleaned = path::clean(path).ok_or_else(|| ZipFsError::NotFound {
            op: OP,
            path: path.to_string(),
            archive: path.to_string(),
        })?;

        let stat = backing
            .stat(&cleaned)
            .await
            .map_err(|e| ZipFsError::from_backing(OP, &cleaned, e))?;
        if stat.is_dir {
            return Err(ZipFsError::InvalidArgument {
                op: OP,
                path: cleaned,
            });
        }

        Ok(Self {
            backing,
            path: cleaned,
            size: stat.size,
            state: Mutex::new(State::Unopened),
        })
    }

    /// Path of the archive inside the backing filesystem.
    pub fn archive_path(&self) -> &str {
        &self.path
    }

    /// Archive size in bytes, as seen when the filesystem was created.
    pub fn archive_size(&self) -> u64 {
        self.size
    }

    pub async fn is_opened(&self) -> bool {
        matches!(*self.state.lock().await, State::Opened(_))
    }

    pub async fn is_closed(&self) -> bool {
        matches!(*self.state.lock().await, State::Closed)
    }

    /// Open the regular file at `name` for sequential reading.
    ///
    /// Directories inferred from entry paths cannot be opened. An explicit
    /// directory entry in the archive opens as an empty stream.
    #[tracing::instrument(level = "debug", skip(self), fields(archive = %self.path))]
    pub async fn open(&self, name: &str) -> Result<EntryReader> {
        const OP: &str = "open";
        let path = self.clean(OP, name)?;
        let archive = self.archive(OP).await?;
        let reader = archive.parser.reader().clone();

        let Some(entry) = archive.index.file(&path) else {
            if archive.index.is_marker(&path) {
                return Ok(EntryReader::empty(reader, path));
            }
            return Err(self.not_found(OP, path));
        };

        if entry.is_encrypted() {
            return Err(self.unsupported(OP, path, "encryption".to_string()));
        }
        if let CompressionMethod::Unknown(method) = entry.compression_method {
            return Err(self.unsupported(OP, path, format!("compression method {method}")));
        }

        let offset = archive
            .parser
            .get_data_offset(entry)
            .await
            .map_err(|e| self.corrupt(OP, e))?;
        EntryReader::new(reader, entry, offset).map_err(|e| self.corrupt(OP, e))
    }

    /// List the immediate children of the directory `dir`.
    ///
    /// Each child appears once, in the order the archive first mentions it.
    /// That is archive order, not lexical order. A path with nothing below it
    /// is `NotFound` unless the archive has an explicit entry for it.
    #[tracing::instrument(level = "debug", skip(self), fields(archive = %self.path))]
    pub async fn read_dir(&self, dir: &str) -> Result<Vec<DirEntry>> {
        const OP: &str = "read_dir";
        let path = self.clean(OP, dir)?;
        let archive = self.archive(OP).await?;

        match archive.index.read_dir(&path) {
            Some(children) => Ok(children.iter().cloned().map(DirEntry::from).collect()),
            None => Err(self.not_found(OP, path)),
        }
    }

    /// Metadata for the file or directory at `name`.
    #[tracing::instrument(level = "debug", skip(self), fields(archive = %self.path))]
    pub async fn stat(&self, name: &str) -> Result<FileInfo> {
        self.file_info("stat", name).await
    }

    /// Uncompressed size of `name`, 0 for directories.
    pub async fn size(&self, name: &str) -> Result<u64> {
        Ok(self.file_info("size", name).await?.size())
    }

    pub async fn is_dir(&self, name: &str) -> Result<bool> {
        Ok(self.file_info("is_dir", name).await?.is_dir())
    }

    /// Release the archive handle and drop the index.
    ///
    /// Works whether or not the archive was ever opened. Closing twice fails
    /// with `ClosedHandle`. Readers returned by [`open`](Self::open) share the
    /// handle and may fail once it is closed.
    #[tracing::instrument(level = "debug", skip(self), fields(archive = %self.path))]
    pub async fn close(&self) -> Result<()> {
        const OP: &str = "close";
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, State::Closed) {
            State::Closed => Err(self.closed(OP)),
            State::Unopened => Ok(()),
            State::Opened(archive) => {
                archive
                    .parser
                    .reader()
                    .close()
                    .await
                    .map_err(|e| ZipFsError::Io {
                        op: OP,
                        path: self.path.clone(),
                        source: e.into(),
                    })
            }
        }
    }

    async fn file_info(&self, op: &'static str, name: &str) -> Result<FileInfo> {
        let path = self.clean(op, name)?;
        let archive = self.archive(op).await?;
        archive
            .index
            .stat(&path)
            .ok_or_else(|| self.not_found(op, path))
    }

    /// Opened archive, opening it first if needed.
    ///
    /// The state lock is held across the open, which is what makes
    /// concurrent first callers wait instead of opening a second handle.
    async fn archive(&self, op: &'static str) -> Result<Arc<OpenArchive>> {
        let mut state = self.state.lock().await;
        match &*state {
            State::Opened(archive) => return Ok(archive.clone()),
            State::Closed => return Err(self.closed(op)),
            State::Unopened => {}
        }

        let archive = Arc::new(self.load(op).await?);
        *state = State::Opened(archive.clone());
        Ok(archive)
    }

    async fn load(&self, op: &'static str) -> Result<OpenArchive> {
        tracing::debug!(archive = %self.path, size = self.size, "opening archive");
        let file = self
            .backing
            .open(&self.path)
            .await
            .map_err(|e| ZipFsError::from_backing(op, &self.path, e))?;

        let reader = match file {
            BackingFile::RandomAccess(reader) => reader,
            BackingFile::Sequential(_) => {
                return Err(ZipFsError::CapabilityUnsupported {
                    op,
                    archive: self.path.clone(),
                });
            }
        };

        let parser = ZipParser::with_size(reader, self.size);
        let entries = match parser.list_files().await {
            Ok(entries) => entries,
            Err(err) => {
                if let Err(close_err) = parser.reader().close().await {
                    tracing::warn!(archive = %self.path, "failed to release archive handle: {close_err:#}");
                }
                return Err(self.corrupt(op, err));
            }
        };

        let index = ArchiveIndex::build(entries);
        tracing::debug!(
            archive = %self.path,
            entries = index.entry_count(),
            "archive opened"
        );
        Ok(OpenArchive { parser, index })
    }

    fn clean(&self, op: &'static str, name: &str) -> Result<String> {
        path::clean(name).ok_or_else(|| self.not_found(op, name.to_string()))
    }

    fn not_found(&self, op: &'static str, path: String) -> ZipFsError {
        ZipFsError::NotFound {
            op,
            path,
            archive: self.path.clone(),
        }
    }

    fn closed(&self, op: &'static str) -> ZipFsError {
        ZipFsError::ClosedHandle {
            op,
            archive: self.path.clone(),
        }
    }

    fn corrupt(&self, op: &'static str, err: anyhow::Error) -> ZipFsError {
        ZipFsError::CorruptArchive {
            op,
            archive: self.path.clone(),
            source: err.into(),
        }
    }

    fn unsupported(&self, op: &'static str, path: String, feature: String) -> ZipFsError {
        ZipFsError::Unsupported {
            op,
            path,
            archive: self.path.clone(),
            feature,
        }
    }
}

impl std::fmt::Debug for ZipFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipFs")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
