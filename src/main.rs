//! Main entry point for the zipfs CLI application.
//!
//! Opens a ZIP archive from the local filesystem or a remote HTTP URL and
//! answers `ls`, `cat` and `stat` requests against it without extracting it.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

use zipfs::cli::Command;
use zipfs::{BackingFs, Cli, FileInfo, HttpFs, LocalFs, ZipFs};

/// Application entry point.
///
/// Parses command-line arguments, picks a backing filesystem based on whether
/// the archive is a local file or an HTTP URL, and dispatches the command.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.default_log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.is_http_url() {
        // Serve the remote archive via HTTP Range requests
        let (base, name) = cli
            .archive
            .rsplit_once('/')
            .context("archive URL has no file name")?;
        let http = Arc::new(HttpFs::new(base)?);
        let transferred_before = http.transferred_bytes();

        run(http.clone(), name, &cli).await?;

        // Display network transfer statistics for HTTP sources
        if cli.verbose > 0 {
            let transferred = http.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        let path = Path::new(&cli.archive);
        let root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => ".".into(),
        };
        let name = path
            .file_name()
            .context("archive path has no file name")?
            .to_string_lossy()
            .into_owned();
        run(Arc::new(LocalFs::new(root)), &name, &cli).await?;
    }

    Ok(())
}

/// Open the archive and execute the requested command.
///
/// The archive is closed afterwards even when the command fails.
async fn run(backing: Arc<dyn BackingFs>, name: &str, cli: &Cli) -> Result<()> {
    let zfs = ZipFs::new(backing, name).await?;

    let result = match &cli.command {
        Command::Ls { dir, long } => list_dir(&zfs, dir, *long).await,
        Command::Cat { paths } => cat_files(&zfs, paths).await,
        Command::Stat { path } => stat_path(&zfs, path).await,
    };

    zfs.close().await?;
    result
}

/// List a directory, in archive order.
async fn list_dir(zfs: &ZipFs, dir: &str, long: bool) -> Result<()> {
    let entries = zfs.read_dir(dir).await?;

    for entry in &entries {
        let suffix = if entry.is_dir() { "/" } else { "" };
        if long {
            let info = entry.info();
            println!(
                "{}  {:>10}  {}  {}{}",
                info.mode_string(),
                info.size(),
                info.modified().format("%Y-%m-%d %H:%M"),
                entry.name(),
                suffix
            );
        } else {
            println!("{}{}", entry.name(), suffix);
        }
    }

    Ok(())
}

/// Stream each file to stdout, one after the other.
async fn cat_files(zfs: &ZipFs, paths: &[String]) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    for path in paths {
        let mut reader = zfs.open(path).await?.into_async_read();
        tokio::io::copy(&mut reader, &mut stdout)
            .await
            .with_context(|| format!("cannot read {path}"))?;
    }

    stdout.flush().await?;
    Ok(())
}

async fn stat_path(zfs: &ZipFs, path: &str) -> Result<()> {
    let info = zfs.stat(path).await?;
    print_info(path, &info);
    Ok(())
}

fn print_info(path: &str, info: &FileInfo) {
    let kind = if info.is_dir() { "directory" } else { "regular file" };
    println!("  Path: {}", path);
    println!("  Name: {}", info.name());
    println!("  Type: {}", kind);
    println!("  Size: {} ({})", info.size(), format_size(info.size()));
    println!("  Mode: {:04o} ({})", info.mode(), info.mode_string());
    println!("Modify: {}", info.modified().to_rfc3339());
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// assert_eq!(format_size(1048576), "1.00 MB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
