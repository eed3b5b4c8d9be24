use std::io;
use std::sync::Arc;

use anyhow::{Result, bail};
use flate2::{Decompress, FlushDecompress, Status};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::io::ReadAt;

use super::structures::{CompressionMethod, ZipFileEntry};

/// Compressed bytes fetched from the source per refill.
const INPUT_CHUNK_SIZE: usize = 64 * 1024;

/// Decompressed bytes produced per item when adapted to [`AsyncRead`].
const STREAM_CHUNK_SIZE: usize = 32 * 1024;

/// Sequential reader over the decompressed content of one archive entry.
///
/// Compressed data is pulled from the archive in chunks as the caller reads,
/// so memory use does not depend on the entry size. The CRC-32 recorded in the
/// central directory is checked once the last byte has been produced.
pub struct EntryReader {
    source: Arc<dyn ReadAt>,
    name: String,
    /// Next compressed byte to fetch
    offset: u64,
    compressed_remaining: u64,
    /// Decompressed bytes still owed to the caller
    remaining: u64,
    inflater: Option<Decompress>,
    pending: Vec<u8>,
    pending_pos: usize,
    hasher: crc32fast::Hasher,
    expected_crc: u32,
}

impl EntryReader {
    /// Create a reader for `entry` whose data starts at `data_offset`.
    ///
    /// Fails for compression methods other than STORED and DEFLATE.
    pub fn new(source: Arc<dyn ReadAt>, entry: &ZipFileEntry, data_offset: u64) -> Result<Self> {
        let inflater = match entry.compression_method {
            CompressionMethod::Stored => {
                if entry.compressed_size != entry.uncompressed_size {
                    bail!(
                        "Stored entry {} has mismatched sizes {} and {}",
                        entry.file_name,
                        entry.compressed_size,
                        entry.uncompressed_size
                    );
                }
                None
            }
            CompressionMethod::Deflate => Some(Decompress::new(false)),
            CompressionMethod::Unknown(method) => {
                bail!("Unsupported compression method: {}", method)
            }
        };

        Ok(Self {
            source,
            name: entry.file_name.clone(),
            offset: data_offset,
            compressed_remaining: entry.compressed_size,
            remaining: entry.uncompressed_size,
            inflater,
            pending: Vec::new(),
            pending_pos: 0,
            hasher: crc32fast::Hasher::new(),
            expected_crc: entry.crc32,
        })
    }

    /// Reader that yields nothing, for explicit directory entries.
    pub fn empty(source: Arc<dyn ReadAt>, name: impl Into<String>) -> Self {
        Self {
            source,
            name: name.into(),
            offset: 0,
            compressed_remaining: 0,
            remaining: 0,
            inflater: None,
            pending: Vec::new(),
            pending_pos: 0,
            hasher: crc32fast::Hasher::new(),
            expected_crc: 0,
        }
    }

    /// Archive-internal name of the entry being read.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decompressed bytes not yet returned.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read up to `buf.len()` decompressed bytes; `Ok(0)` marks the end.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.remaining == 0 {
            return Ok(0);
        }

        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let out = &mut buf[..want];

        let n = if self.inflater.is_some() {
            self.inflate(out).await?
        } else {
            let n = self.source.read_at(self.offset, out).await?;
            if n == 0 {
                bail!("Unexpected end of archive while reading {}", self.name);
            }
            self.offset += n as u64;
            n
        };

        self.hasher.update(&out[..n]);
        self.remaining -= n as u64;

        if self.remaining == 0 {
            let actual = std::mem::take(&mut self.hasher).finalize();
            if actual != self.expected_crc {
                bail!(
                    "Checksum mismatch for {}: expected {:08x}, got {:08x}",
                    self.name,
                    self.expected_crc,
                    actual
                );
            }
        }

        Ok(n)
    }

    /// Read everything that is left, appending to `out`.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let start = out.len();
        out.reserve(usize::try_from(self.remaining).unwrap_or(0).min(STREAM_CHUNK_SIZE * 32));
        let mut chunk = vec![0u8; STREAM_CHUNK_SIZE];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(out.len() - start);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    /// Adapt into a [`tokio::io::AsyncRead`] for serving layers.
    pub fn into_async_read(self) -> impl AsyncRead + Send + Unpin + 'static {
        StreamReader::new(Box::pin(futures::stream::try_unfold(self, next_chunk)))
    }

    async fn refill(&mut self) -> Result<()> {
        let len = self.compressed_remaining.min(INPUT_CHUNK_SIZE as u64) as usize;
        self.pending.resize(len, 0);
        self.source.read_exact_at(self.offset, &mut self.pending).await?;
        self.offset += len as u64;
        self.compressed_remaining -= len as u64;
        self.pending_pos = 0;
        Ok(())
    }

    async fn inflate(&mut self, out: &mut [u8]) -> Result<usize> {
        loop {
            if self.pending_pos == self.pending.len() && self.compressed_remaining > 0 {
                self.refill().await?;
            }

            let Some(inflater) = self.inflater.as_mut() else {
                bail!("Entry {} is not compressed", self.name);
            };
            let (in_before, out_before) = (inflater.total_in(), inflater.total_out());
            let status = inflater.decompress(
                &self.pending[self.pending_pos..],
                out,
                FlushDecompress::None,
            )?;
            let consumed = (inflater.total_in() - in_before) as usize;
            let produced = (inflater.total_out() - out_before) as usize;
            self.pending_pos += consumed;

            if produced > 0 {
                return Ok(produced);
            }

            // No output and no progress on input: truncated or corrupt stream
            if status == Status::StreamEnd || consumed == 0 {
                bail!(
                    "Compressed data for {} ended with {} bytes missing",
                    self.name,
                    self.remaining
                );
            }
        }
    }
}

async fn next_chunk(
    mut reader: EntryReader,
) -> io::Result<Option<(io::Cursor<Vec<u8>>, EntryReader)>> {
    let mut chunk = vec![0u8; STREAM_CHUNK_SIZE];
    let n = reader.read(&mut chunk).await.map_err(io::Error::other)?;
    if n == 0 {
        return Ok(None);
    }
    chunk.truncate(n);
    Ok(Some((io::Cursor::new(chunk), reader)))
}

impl std::fmt::Debug for EntryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader")
            .field("name", &self.name)
            .field("remaining", &self.remaining)
            .field("deflate", &self.inflater.is_some())
            .finish()
    }
}
