//! In-memory index over an archive's central directory.
//!
//! Built once when the archive is opened. Archive entries are flat paths, so
//! directories are inferred: every proper prefix of an entry path is a
//! directory, and so is every explicit directory entry (`a/c/`). Each
//! directory keeps its children in the order the archive first mentions them,
//! deduplicated by name.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::path;
use crate::zip::ZipFileEntry;

use super::info::FileInfo;

struct DirNode {
    info: FileInfo,
    /// Backed by an explicit directory entry rather than inferred
    marker: bool,
    children: Vec<FileInfo>,
}

struct DirBuilder {
    modified: DateTime<Utc>,
    mode: Option<u32>,
    children: Vec<String>,
    seen: HashSet<String>,
}

impl DirBuilder {
    fn new(modified: DateTime<Utc>) -> Self {
        Self {
            modified,
            mode: None,
            children: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn add_child(&mut self, name: &str) {
        if self.seen.insert(name.to_string()) {
            self.children.push(name.to_string());
        }
    }
}

pub(crate) struct ArchiveIndex {
    entries: Vec<ZipFileEntry>,
    files: HashMap<String, usize>,
    dirs: HashMap<String, DirNode>,
}

impl ArchiveIndex {
    /// Index `entries`, given in central directory order.
    ///
    /// Entry names are cleaned like request paths. Names that clean to the
    /// root or climb above it are dropped. When two entries clean to the same
    /// file path the first one wins.
    pub(crate) fn build(entries: Vec<ZipFileEntry>) -> Self {
        let mut files: HashMap<String, usize> = HashMap::new();
        let mut builders: HashMap<String, DirBuilder> = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            let Some(cleaned) = path::clean_entry(&entry.file_name).filter(|p| !p.is_empty()) else {
                tracing::warn!(entry = %entry.file_name, "skipping archive entry with unusable path");
                continue;
            };
            let modified = entry.modified();

            for ancestor in path::ancestors(&cleaned) {
                let child_start = if ancestor.is_empty() { 0 } else { ancestor.len() + 1 };
                let child = cleaned[child_start..]
                    .split('/')
                    .next()
                    .unwrap_or_default();
                builders
                    .entry(ancestor.to_string())
                    .or_insert_with(|| DirBuilder::new(modified))
                    .add_child(child);
            }

            if entry.is_dir() {
                let dir = builders
                    .entry(cleaned)
                    .or_insert_with(|| DirBuilder::new(modified));
                if dir.mode.is_none() {
                    dir.modified = modified;
                    dir.mode = Some(entry.mode());
                }
            } else if files.contains_key(&cleaned) {
                tracing::warn!(entry = %entry.file_name, "skipping duplicate archive entry");
            } else {
                files.insert(cleaned, idx);
            }
        }

        builders
            .entry(String::new())
            .or_insert_with(|| DirBuilder::new(DateTime::UNIX_EPOCH));

        let mut index = Self {
            entries,
            files,
            dirs: HashMap::with_capacity(builders.len()),
        };

        // Directory metadata first, so children can be resolved against it
        let mut pending = Vec::with_capacity(builders.len());
        for (dir_path, builder) in builders {
            let name = path::base_name(&dir_path).to_string();
            let info = match builder.mode {
                Some(mode) => FileInfo::directory(name, builder.modified, mode),
                None => FileInfo::synthesized_directory(name, builder.modified),
            };
            index.dirs.insert(
                dir_path.clone(),
                DirNode {
                    info,
                    marker: builder.mode.is_some(),
                    children: Vec::new(),
                },
            );
            pending.push((dir_path, builder.children));
        }

        for (dir_path, names) in pending {
            let children = names
                .iter()
                .filter_map(|name| index.stat(&path::join(&dir_path, name)))
                .collect();
            if let Some(node) = index.dirs.get_mut(&dir_path) {
                node.children = children;
            }
        }

        index
    }

    /// Number of entries in the central directory, including skipped ones.
    pub(crate) fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Regular file entry stored under exactly `path`.
    pub(crate) fn file(&self, path: &str) -> Option<&ZipFileEntry> {
        self.files.get(path).map(|&idx| &self.entries[idx])
    }

    /// Whether `path` has an explicit directory entry in the archive.
    pub(crate) fn is_marker(&self, path: &str) -> bool {
        self.dirs.get(path).is_some_and(|dir| dir.marker)
    }

    /// Metadata for `path`. An exact file entry takes precedence over a
    /// directory of the same name.
    pub(crate) fn stat(&self, path: &str) -> Option<FileInfo> {
        if let Some(entry) = self.file(path) {
            return Some(FileInfo::file(path::base_name(path), entry));
        }
        self.dirs.get(path).map(|dir| dir.info.clone())
    }

    /// Immediate children of the directory `path`, in archive order.
    pub(crate) fn read_dir(&self, path: &str) -> Option<&[FileInfo]> {
        self.dirs.get(path).map(|dir| dir.children.as_slice())
    }
}
