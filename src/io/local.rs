use super::{BackingFile, BackingFs, BackingStat, ReadAt};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Local file reader with random access support
pub struct LocalFileReader {
    file: RwLock<Option<std::fs::File>>,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: RwLock::new(Some(file)),
            size,
        })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let guard = self.file.read();
        let file = guard
            .as_ref()
            .ok_or_else(|| anyhow!("Read from closed file"))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            Ok(file.read_at(buf, offset)?)
        }

        #[cfg(windows)]
        {
            // seek_read moves the file cursor, which nothing else relies on
            use std::os::windows::fs::FileExt;
            Ok(file.seek_read(buf, offset)?)
        }

        #[cfg(not(any(unix, windows)))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = file;
            file.seek(SeekFrom::Start(offset))?;
            Ok(file.read(buf)?)
        }
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn close(&self) -> Result<()> {
        self.file.write().take();
        Ok(())
    }
}

/// A directory on the local disk serving as backing filesystem.
///
/// Paths given to it are relative to `root` and may not climb out of it.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let cleaned = crate::path::clean(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{path} escapes {}", self.root.display()),
            )
        })?;
        Ok(self.root.join(cleaned))
    }
}

#[async_trait]
impl BackingFs for LocalFs {
    async fn stat(&self, path: &str) -> io::Result<BackingStat> {
        let metadata = tokio::fs::metadata(self.resolve(path)?).await?;
        Ok(BackingStat {
            size: metadata.len(),
            is_dir: metadata.is_dir(),
        })
    }

    async fn open(&self, path: &str) -> io::Result<BackingFile> {
        let full = self.resolve(path)?;
        let reader = tokio::task::spawn_blocking(move || LocalFileReader::new(&full))
            .await
            .map_err(io::Error::other)?
            .map_err(|e| match e.downcast::<io::Error>() {
                Ok(io_err) => io_err,
                Err(other) => io::Error::other(other),
            })?;
        Ok(BackingFile::RandomAccess(Arc::new(reader)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_stat_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("data.bin")).unwrap();
        file.write_all(b"0123456789").unwrap();
        drop(file);

        let fs = LocalFs::new(dir.path());
        let stat = fs.stat("data.bin").await.unwrap();
        assert_eq!(stat, BackingStat { size: 10, is_dir: false });

        let BackingFile::RandomAccess(reader) = fs.open("data.bin").await.unwrap() else {
            panic!("local files are random access");
        };
        let mut buf = [0u8; 4];
        reader.read_exact_at(3, &mut buf).await.unwrap();
        assert_eq!(&buf, b"3456");

        reader.close().await.unwrap();
        assert!(reader.read_at(0, &mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_stat_directory_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("data")).unwrap();

        let fs = LocalFs::new(dir.path());
        assert!(fs.stat("data/").await.unwrap().is_dir);

        let err = fs.stat("nope.zip").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err = fs.stat("../outside.zip").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
