//! # zipfs
//!
//! A read-only virtual filesystem over ZIP archives.
//!
//! The archive is never extracted. Files are looked up by path, streamed
//! straight out of the archive, and directory listings are synthesized from
//! the flat list of entries in the central directory. The archive itself can
//! live on the local disk, in memory, or on a remote HTTP server that
//! supports Range requests, in which case only the central directory and the
//! requested entries are fetched.
//!
//! ## Features
//!
//! - Lazy opening: nothing is read until the first request
//! - Directory listings inferred from entry paths, deduplicated, in archive order
//! - Streaming STORED and DEFLATE decompression with CRC-32 verification
//! - ZIP64 archives, Unix permissions and extended timestamps
//! - Pluggable backing storage through [`BackingFs`]
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use zipfs::{HttpFs, ZipFs};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Serve a remote archive without downloading it
//!     let backing = Arc::new(HttpFs::new("https://example.com/archives")?);
//!     let zfs = ZipFs::new(backing, "site.zip").await?;
//!
//!     for entry in zfs.read_dir("").await? {
//!         println!("{}{}", entry.name(), if entry.is_dir() { "/" } else { "" });
//!     }
//!
//!     zfs.close().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod fs;
pub mod io;
pub mod path;
pub mod zip;

pub use cli::Cli;
pub use error::{Result, ZipFsError};
pub use fs::{DirEntry, FileInfo, FileType, ZipFs};
pub use io::{
    BackingFile, BackingFs, BackingStat, HttpFs, HttpRangeReader, LocalFileReader, LocalFs,
    MemoryFs, MemoryReader, ReadAt,
};
pub use zip::{EntryReader, ZipFileEntry, ZipParser};
