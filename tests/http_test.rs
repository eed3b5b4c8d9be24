use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::{Client, Url};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use zipfs::{BackingFile, BackingFs, HttpFs, HttpRangeReader, ReadAt, ZipFs, ZipFsError};

fn sample_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);
    writer.start_file("a/b.txt", options).unwrap();
    writer.write_all(b"0123456789").unwrap();
    writer.start_file("a/c/d.txt", options).unwrap();
    writer.write_all(b"hello").unwrap();
    writer.finish().unwrap().into_inner()
}

/// Serves one archive as `site.zip` under three prefixes:
/// `/ranged/` honours Range, `/plain/` never advertises it and
/// `/ignores-range/` advertises it but always answers 200.
struct TestServer {
    addr: SocketAddr,
    gets: Arc<AtomicUsize>,
}

impl TestServer {
    async fn start(archive: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let archive: Arc<[u8]> = archive.into();
        let gets = Arc::new(AtomicUsize::new(0));

        let counter = gets.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle(stream, archive.clone(), counter.clone()));
            }
        });

        Self { addr, gets }
    }

    fn fs(&self, prefix: &str) -> Arc<HttpFs> {
        let client = Client::builder().no_proxy().build().unwrap();
        let base = format!("http://{}/{prefix}", self.addr);
        Arc::new(HttpFs::with_client(&base, client).unwrap())
    }

    fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}/{path}", self.addr)).unwrap()
    }

    fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

async fn handle(mut stream: TcpStream, archive: Arc<[u8]>, gets: Arc<AtomicUsize>) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let request = String::from_utf8_lossy(&request).into_owned();
    let mut lines = request.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default();
    let path = request_line.next().unwrap_or_default();
    let range = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("range").then(|| value.trim().to_string())
    });

    let head = method == "HEAD";
    if !head {
        gets.fetch_add(1, Ordering::SeqCst);
    }

    let (prefix, name) = path.trim_start_matches('/').split_once('/').unwrap_or(("", ""));
    let response = match (prefix, name, range) {
        ("ranged", "site.zip", Some(range)) => {
            let (start, end) = parse_range(&range, archive.len());
            let content_range = format!("bytes {start}-{end}/{}", archive.len());
            response(
                "206 Partial Content",
                &[("Accept-Ranges", "bytes"), ("Content-Range", content_range.as_str())],
                &archive[start..=end],
                head,
            )
        }
        ("ranged" | "ignores-range", "site.zip", _) => {
            response("200 OK", &[("Accept-Ranges", "bytes")], &archive, head)
        }
        ("plain", "site.zip", _) => response("200 OK", &[], &archive, head),
        _ => response("404 Not Found", &[], b"", head),
    };

    let _ = stream.write_all(&response).await;
    let _ = stream.shutdown().await;
}

fn parse_range(range: &str, len: usize) -> (usize, usize) {
    let spec = range.trim_start_matches("bytes=");
    let (start, end) = spec.split_once('-').unwrap_or((spec, ""));
    let start = start.parse().unwrap_or(0);
    let end = end.parse().map_or(len - 1, |end: usize| end.min(len - 1));
    (start, end)
}

fn response(status: &str, headers: &[(&str, &str)], body: &[u8], head: bool) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");

    let mut out = out.into_bytes();
    if !head {
        out.extend_from_slice(body);
    }
    out
}

#[tokio::test]
async fn test_browse_archive_over_range_requests() {
    let archive = sample_zip();
    let server = TestServer::start(archive.clone()).await;
    let http = server.fs("ranged");

    let zfs = ZipFs::new(http.clone(), "site.zip").await.unwrap();
    assert_eq!(zfs.archive_size(), archive.len() as u64);

    let names: Vec<String> = zfs
        .read_dir("a")
        .await
        .unwrap()
        .iter()
        .map(|e| e.name().to_string())
        .collect();
    assert_eq!(names, vec!["b.txt", "c"]);

    let mut data = Vec::new();
    zfs.open("a/c/d.txt").await.unwrap().read_to_end(&mut data).await.unwrap();
    assert_eq!(data, b"hello");

    assert!(http.transferred_bytes() > 0);
    assert!(server.gets() > 0);
    zfs.close().await.unwrap();
}

#[tokio::test]
async fn test_server_without_ranges_is_rejected_without_download() {
    let server = TestServer::start(sample_zip()).await;
    let zfs = ZipFs::new(server.fs("plain"), "site.zip").await.unwrap();

    let err = zfs.read_dir("").await.unwrap_err();
    assert!(matches!(err, ZipFsError::CapabilityUnsupported { .. }), "{err}");
    assert!(!zfs.is_opened().await);
    // Only HEAD requests went out
    assert_eq!(server.gets(), 0);
}

#[tokio::test]
async fn test_body_stream_fallback() {
    let archive = sample_zip();
    let server = TestServer::start(archive.clone()).await;
    let http = server.fs("plain");

    let BackingFile::Sequential(mut body) = http.open("site.zip").await.unwrap() else {
        panic!("expected a sequential body without Accept-Ranges");
    };
    assert_eq!(server.gets(), 0);

    let mut data = Vec::new();
    body.read_to_end(&mut data).await.unwrap();
    assert_eq!(data, archive);
    assert_eq!(server.gets(), 1);
}

#[tokio::test]
async fn test_missing_archive_is_not_found() {
    let server = TestServer::start(sample_zip()).await;

    let err = ZipFs::new(server.fs("ranged"), "missing.zip").await.unwrap_err();
    assert!(err.is_not_found(), "{err}");

    let err = server.fs("ranged").stat("missing.zip").await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}

#[tokio::test]
async fn test_range_answered_with_full_body_fails() {
    let archive = sample_zip();
    let server = TestServer::start(archive.clone()).await;

    let zfs = ZipFs::new(server.fs("ignores-range"), "site.zip").await.unwrap();
    let err = zfs.read_dir("a").await.unwrap_err();
    assert!(matches!(err, ZipFsError::CorruptArchive { .. }), "{err}");

    let client = Client::builder().no_proxy().build().unwrap();
    let reader = HttpRangeReader::new(
        client,
        server.url("ignores-range/site.zip"),
        archive.len() as u64,
    );
    let mut buf = [0u8; 4];
    let err = reader.read_at(0, &mut buf).await.unwrap_err();
    assert!(err.to_string().contains("200"), "{err}");
    assert_eq!(reader.transferred_bytes(), 0);
}
