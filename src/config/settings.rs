//! Configuration settings for transferbar
//!
//! Defines the CLI arguments, the enumerated transfer policies and the
//! fixed render settings of the progress view.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Interval between two render ticks of the progress view
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(50);

/// Terminal width the progress lines are laid out for
pub const DISPLAY_WIDTH: u16 = 130;

/// Names longer than this are elided in the middle
pub const NAME_DISPLAY_LIMIT: usize = 40;

/// Characters kept on each side of an elided name
pub const NAME_KEEP: usize = 20;

/// Default I/O chunk size of the transfer driver
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Transferbar - live progress for concurrent uploads and downloads
#[derive(Parser, Debug, Clone)]
#[command(name = "transferbar")]
#[command(author = "Transferbar Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Concurrent file transfers with live terminal progress")]
#[command(long_about = r#"
Transferbar moves files between a local directory and a file store while
rendering one live progress bar per transfer.

Examples:
  transferbar upload ./photos --to /srv/store            # Upload a directory
  transferbar upload a.bin b.bin --to /srv/store -v      # Upload two files
  transferbar download a.bin --from /srv/store --output ./out/
"#)]
pub struct CliArgs {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no progress bars, shorter messages)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Print the final summary as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit log records as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Upload files or directories into a store directory
    Upload {
        /// Files or directories to upload (directories are not recursed)
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Store directory receiving the files
        #[arg(long, value_name = "DIR")]
        to: PathBuf,

        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Download files from a store directory
    Download {
        /// Names of the files inside the store
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,

        /// Store directory to read from
        #[arg(long, value_name = "DIR")]
        from: PathBuf,

        /// Output file, or directory when it ends with a separator or exists
        #[arg(short, long, default_value = "./", value_name = "PATH")]
        output: String,

        #[command(flatten)]
        transfer: TransferArgs,
    },
}

/// Options shared by uploads and downloads
#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    /// Order in which transfers are started and displayed
    #[arg(long, value_enum, default_value = "modified")]
    pub order: FileOrder,

    /// Reverse the ordering
    #[arg(short = 'r', long)]
    pub reverse: bool,

    /// What to do when checksums don't match
    #[arg(long, value_enum, default_value = "warn")]
    pub verify: ChecksumPolicy,

    /// Checksum algorithm
    #[arg(long, value_enum, default_value = "sha256")]
    pub algorithm: HashAlgorithm,
}

/// Hash algorithm used for transfer checksums
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256 - Standard cryptographic hash
    #[default]
    #[value(name = "sha256")]
    Sha256,
    /// BLAKE3 - Fast and cryptographically secure
    #[value(name = "blake3")]
    Blake3,
    /// XXHash3 - Ultra fast, non-cryptographic (128-bit)
    #[value(name = "xxhash3")]
    XXHash3,
}

impl HashAlgorithm {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Blake3 => "BLAKE3",
            Self::XXHash3 => "XXHash3",
        }
    }
}

/// File ordering for a batch of transfers
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileOrder {
    /// Alphabetical by display name
    Name,
    /// By size, smallest first
    Size,
    /// By modification time, newest first
    #[default]
    Modified,
}

/// Handling of a checksum mismatch after a transfer
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// A mismatch fails the transfer
    Strict,
    /// A mismatch is reported but the transfer counts as done
    #[default]
    Warn,
    /// Don't verify the written data
    Skip,
}

/// Render settings of a progress view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewConfig {
    /// Interval between render ticks
    pub refresh_interval: Duration,
    /// Terminal width the lines are laid out for
    pub width: u16,
    /// Draw nothing (quiet mode, tests)
    pub hidden: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            refresh_interval: REFRESH_INTERVAL,
            width: DISPLAY_WIDTH,
            hidden: false,
        }
    }
}

impl ViewConfig {
    /// A view configuration that renders nothing
    pub fn hidden() -> Self {
        Self {
            hidden: true,
            ..Default::default()
        }
    }

    /// Draw rate derived from the refresh interval, clamped to what the
    /// terminal backend accepts
    pub fn refresh_hz(&self) -> u8 {
        let millis = self.refresh_interval.as_millis().max(1);
        (1000 / millis).clamp(1, u8::MAX as u128) as u8
    }
}

/// Settings the transfer driver runs with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Checksum algorithm
    pub algorithm: HashAlgorithm,
    /// Mismatch handling
    pub policy: ChecksumPolicy,
    /// Shorter completion lines
    pub quiet: bool,
    /// Read/write chunk size in bytes
    pub chunk_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::default(),
            policy: ChecksumPolicy::default(),
            quiet: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransferOptions {
    /// Build driver options from CLI arguments
    pub fn from_cli(args: &TransferArgs, quiet: bool) -> Self {
        Self {
            algorithm: args.algorithm,
            policy: args.verify,
            quiet,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_hz() {
        assert_eq!(ViewConfig::default().refresh_hz(), 20);

        let slow = ViewConfig {
            refresh_interval: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(slow.refresh_hz(), 1);
    }

    #[test]
    fn test_parse_upload() {
        let args = CliArgs::try_parse_from([
            "transferbar",
            "upload",
            "a.bin",
            "b.bin",
            "--to",
            "/store",
            "--order",
            "size",
            "--verify",
            "strict",
            "-q",
        ])
        .unwrap();

        assert!(args.quiet);
        match args.command {
            Commands::Upload { paths, to, transfer } => {
                assert_eq!(paths.len(), 2);
                assert_eq!(to, PathBuf::from("/store"));
                assert_eq!(transfer.order, FileOrder::Size);
                assert_eq!(transfer.verify, ChecksumPolicy::Strict);
                assert_eq!(transfer.algorithm, HashAlgorithm::Sha256);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_download_defaults() {
        let args = CliArgs::try_parse_from([
            "transferbar",
            "download",
            "report.pdf",
            "--from",
            "/store",
        ])
        .unwrap();

        match args.command {
            Commands::Download { names, output, transfer, .. } => {
                assert_eq!(names, vec!["report.pdf".to_string()]);
                assert_eq!(output, "./");
                assert_eq!(transfer.order, FileOrder::Modified);
                assert_eq!(transfer.verify, ChecksumPolicy::Warn);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_upload_requires_paths() {
        assert!(CliArgs::try_parse_from(["transferbar", "upload", "--to", "/store"]).is_err());
    }
}
