use async_trait::async_trait;
use futures::{TryStreamExt, stream};
use reqwest::{Client, Response, StatusCode, Url};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::io::StreamReader;

use super::{BackingFile, BackingFs, BackingStat, ReadAt};
use anyhow::{Result, bail};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRY: u32 = 10;

/// HTTP Range reader for remote ZIP files
pub struct HttpRangeReader {
    client: Client,
    url: Url,
    size: u64,
    transferred_bytes: Arc<AtomicU64>,
    max_retry: u32,
}

impl HttpRangeReader {
    /// Create a reader for a resource whose size and Range support are known.
    pub fn new(client: Client, url: Url, size: u64) -> Self {
        Self {
            client,
            url,
            size,
            transferred_bytes: Arc::new(AtomicU64::new(0)),
            max_retry: DEFAULT_MAX_RETRY,
        }
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    fn with_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.transferred_bytes = counter;
        self
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = offset + buf.len() as u64 - 1;
        let end = end.min(self.size - 1);
        let expected_size = (end - offset + 1) as usize;

        let mut received = 0;
        let mut retry_count = 0;

        while received < expected_size {
            let current_start = offset + received as u64;
            let range = format!("bytes={}-{}", current_start, end);

            let result = self
                .client
                .get(self.url.clone())
                .header(reqwest::header::RANGE, &range)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    if resp.status() != StatusCode::PARTIAL_CONTENT {
                        bail!("HTTP request failed with status: {}", resp.status());
                    }

                    let bytes = resp.bytes().await?;
                    if bytes.is_empty() {
                        bail!("Server returned an empty range for {}", range);
                    }
                    let chunk_len = bytes.len().min(expected_size - received);
                    buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
                    received += chunk_len;

                    self.transferred_bytes
                        .fetch_add(chunk_len as u64, Ordering::Relaxed);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        bail!("Max retries exceeded");
                    }
                    tracing::warn!(
                        url = %self.url,
                        "Connection error, retry {}/{}: {}",
                        retry_count,
                        self.max_retry,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Remote directory addressed by a base URL.
///
/// `stat` issues a HEAD request. `open` hands out a random-access
/// [`HttpRangeReader`] when the server advertises `Accept-Ranges: bytes` and
/// a plain body stream otherwise. That stream sends its GET on the first
/// read, so a caller that only needs random access can drop it for free.
pub struct HttpFs {
    client: Client,
    base: Url,
    max_retry: u32,
    transferred_bytes: Arc<AtomicU64>,
}

impl HttpFs {
    pub fn new(base: &str) -> Result<Self> {
        Self::with_timeout(base, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(base, client)
    }

    /// Use a preconfigured client, e.g. one with custom proxy or TLS settings.
    pub fn with_client(base: &str, client: Client) -> Result<Self> {
        // Url::join replaces the last segment unless the base ends with '/'
        let base = if base.ends_with('/') {
            Url::parse(base)?
        } else {
            Url::parse(&format!("{base}/"))?
        };
        Ok(Self {
            client,
            base,
            max_retry: DEFAULT_MAX_RETRY,
            transferred_bytes: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    /// Bytes fetched by all readers opened through this filesystem.
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    fn url(&self, path: &str) -> io::Result<Url> {
        let cleaned = crate::path::clean(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("{path} escapes base URL"))
        })?;
        self.base
            .join(&cleaned)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    async fn head(&self, url: &Url) -> io::Result<Response> {
        let resp = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(io::Error::other)?;

        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{url} returned {}", resp.status()),
            )),
            s => Err(io::Error::other(format!("{url} returned {s}"))),
        }
    }
}

fn content_length(resp: &Response) -> Option<u64> {
    resp.headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

fn accepts_ranges(resp: &Response) -> bool {
    resp.headers()
        .get(reqwest::header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("bytes"))
}

#[async_trait]
impl BackingFs for HttpFs {
    async fn stat(&self, path: &str) -> io::Result<BackingStat> {
        let url = self.url(path)?;
        let resp = self.head(&url).await?;
        let size = content_length(&resp).ok_or_else(|| {
            io::Error::other(format!("{url} did not return Content-Length"))
        })?;
        Ok(BackingStat {
            size,
            is_dir: false,
        })
    }

    async fn open(&self, path: &str) -> io::Result<BackingFile> {
        let url = self.url(path)?;
        let resp = self.head(&url).await?;

        if let (true, Some(size)) = (accepts_ranges(&resp), content_length(&resp)) {
            let reader = HttpRangeReader::new(self.client.clone(), url, size)
                .with_max_retry(self.max_retry)
                .with_counter(self.transferred_bytes.clone());
            return Ok(BackingFile::RandomAccess(Arc::new(reader)));
        }

        tracing::debug!(%url, "server does not support Range requests, body stream only");
        let client = self.client.clone();
        let body = stream::once(async move {
            let resp = client
                .get(url)
                .send()
                .await
                .and_then(Response::error_for_status)
                .map_err(io::Error::other)?;
            Ok::<_, io::Error>(resp.bytes_stream().map_err(io::Error::other))
        })
        .try_flatten();
        Ok(BackingFile::Sequential(Box::new(StreamReader::new(Box::pin(body)))))
    }
}
