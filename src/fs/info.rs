use chrono::{DateTime, Utc};

use crate::zip::{DEFAULT_DIR_MODE, ZipFileEntry};

/// Kind of node in the archive filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    File,
    Directory,
}

/// Metadata snapshot of one file or directory inside the archive.
///
/// Values are copies; they stay valid after the filesystem is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    name: String,
    size: u64,
    is_dir: bool,
    is_regular: bool,
    modified: DateTime<Utc>,
    mode: u32,
}

impl FileInfo {
    pub(crate) fn file(name: impl Into<String>, entry: &ZipFileEntry) -> Self {
        Self {
            name: name.into(),
            size: entry.uncompressed_size,
            is_dir: false,
            is_regular: true,
            modified: entry.modified(),
            mode: entry.mode(),
        }
    }

    pub(crate) fn directory(name: impl Into<String>, modified: DateTime<Utc>, mode: u32) -> Self {
        Self {
            name: name.into(),
            size: 0,
            is_dir: true,
            is_regular: false,
            modified,
            mode,
        }
    }

    pub(crate) fn synthesized_directory(name: impl Into<String>, modified: DateTime<Utc>) -> Self {
        Self::directory(name, modified, DEFAULT_DIR_MODE)
    }

    /// Base name, without any separator. The root is `.`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uncompressed size in bytes, 0 for directories.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_regular(&self) -> bool {
        self.is_regular
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    /// Permission bits (`0o7777` mask).
    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn file_type(&self) -> FileType {
        if self.is_dir {
            FileType::Directory
        } else {
            FileType::File
        }
    }

    /// `ls -l` style rendering of type and permission bits, e.g. `drwxr-xr-x`.
    pub fn mode_string(&self) -> String {
        let mut out = String::with_capacity(10);
        out.push(if self.is_dir { 'd' } else { '-' });
        for shift in [6, 3, 0] {
            let bits = (self.mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    info: FileInfo,
}

impl DirEntry {
    pub fn name(&self) -> &str {
        self.info.name()
    }

    pub fn is_dir(&self) -> bool {
        self.info.is_dir()
    }

    pub fn file_type(&self) -> FileType {
        self.info.file_type()
    }

    /// Same metadata [`ZipFs::stat`](crate::ZipFs::stat) reports for this path.
    pub fn info(&self) -> FileInfo {
        self.info.clone()
    }
}

impl From<FileInfo> for DirEntry {
    fn from(info: FileInfo) -> Self {
        Self { info }
    }
}
