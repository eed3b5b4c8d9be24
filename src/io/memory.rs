use super::{BackingFile, BackingFs, BackingStat, ReadAt};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

/// Random access over an in-memory buffer
pub struct MemoryReader {
    data: Arc<[u8]>,
}

impl MemoryReader {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Clone)]
enum Node {
    File(Arc<[u8]>),
    Dir,
}

/// Backing filesystem holding whole files in memory.
///
/// Suited to archives that arrive over the network and never touch disk.
/// Parent directories of inserted files exist implicitly.
#[derive(Default)]
pub struct MemoryFs {
    nodes: RwLock<HashMap<String, Node>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` at `path`, replacing any previous file.
    pub fn insert(&self, path: &str, data: impl Into<Arc<[u8]>>) -> io::Result<()> {
        let path = Self::key(path)?;
        self.nodes.write().insert(path, Node::File(data.into()));
        Ok(())
    }

    pub fn insert_dir(&self, path: &str) -> io::Result<()> {
        let path = Self::key(path)?;
        self.nodes.write().insert(path, Node::Dir);
        Ok(())
    }

    fn key(path: &str) -> io::Result<String> {
        crate::path::clean(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("{path} escapes root"))
        })
    }

    fn lookup(&self, path: &str) -> io::Result<Node> {
        let path = Self::key(path)?;
        let nodes = self.nodes.read();
        if let Some(node) = nodes.get(&path) {
            return Ok(node.clone());
        }

        let prefix = format!("{path}/");
        if path.is_empty() || nodes.keys().any(|k| k.starts_with(&prefix)) {
            return Ok(Node::Dir);
        }

        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{path} not found"),
        ))
    }
}

#[async_trait]
impl BackingFs for MemoryFs {
    async fn stat(&self, path: &str) -> io::Result<BackingStat> {
        Ok(match self.lookup(path)? {
            Node::File(data) => BackingStat {
                size: data.len() as u64,
                is_dir: false,
            },
            Node::Dir => BackingStat {
                size: 0,
                is_dir: true,
            },
        })
    }

    async fn open(&self, path: &str) -> io::Result<BackingFile> {
        match self.lookup(path)? {
            Node::File(data) => Ok(BackingFile::RandomAccess(Arc::new(MemoryReader::new(data)))),
            Node::Dir => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{path} is a directory"),
            )),
        }
    }
}
