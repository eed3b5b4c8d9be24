use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "zipfs")]
#[command(version)]
#[command(about = "Browse a ZIP archive as a filesystem, locally or over HTTP", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipfs photos.zip ls 2024            list the 2024 directory\n  \
  zipfs photos.zip cat 2024/a.jpg > a.jpg   stream one file out\n  \
  zipfs https://example.com/site.zip stat index.html   stat a remote entry")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List a directory inside the archive
    Ls {
        /// Directory to list (default: archive root)
        #[arg(value_name = "DIR", default_value = "")]
        dir: String,

        /// Long format: mode, size, modification time
        #[arg(short = 'l')]
        long: bool,
    },

    /// Write files from the archive to stdout
    Cat {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<String>,
    },

    /// Show metadata of a file or directory inside the archive
    Stat {
        #[arg(value_name = "PATH")]
        path: String,
    },
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.archive.starts_with("http://") || self.archive.starts_with("https://")
    }

    /// Log filter used when RUST_LOG is not set.
    pub fn default_log_filter(&self) -> String {
        let level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        format!("warn,zipfs={level}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ls() {
        let cli = Cli::parse_from(["zipfs", "photos.zip", "ls", "-l", "2024"]);
        assert!(!cli.is_http_url());
        match cli.command {
            Command::Ls { dir, long } => {
                assert_eq!(dir, "2024");
                assert!(long);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_verbosity_and_url() {
        let cli = Cli::parse_from(["zipfs", "-vv", "https://example.com/a.zip", "stat", "x"]);
        assert!(cli.is_http_url());
        assert_eq!(cli.default_log_filter(), "warn,zipfs=debug");
    }

    #[test]
    fn test_ls_defaults_to_root() {
        let cli = Cli::parse_from(["zipfs", "a.zip", "ls"]);
        assert!(matches!(cli.command, Command::Ls { ref dir, long: false } if dir.is_empty()));
    }
}
