//! Transfer input expansion and output path resolution
//!
//! Turns the paths given on the command line into an ordered list of files
//! and decides where downloaded files land.

use crate::config::FileOrder;
use crate::error::{IoResultExt, Result, TransferError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::time::SystemTime;
use walkdir::WalkDir;

/// A regular file queued for transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Path on disk
    pub path: PathBuf,
    /// File name shown on the progress line
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time
    pub modified: SystemTime,
}

impl InputFile {
    /// Read the metadata of `path`
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path).with_path(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::InvalidPath(path.display().to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }
}

/// Whether a command line argument is an http(s) URL
pub fn is_remote_url(arg: &str) -> bool {
    let lower = arg.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Normalize `.` segments and trailing separators
fn clean_path(path: &Path) -> PathBuf {
    path.components().collect()
}

/// Expand command line paths into regular files.
///
/// URLs and missing paths are skipped with a warning. A directory
/// contributes its direct file children, sorted by name; subdirectories are
/// not entered.
pub fn expand_inputs(paths: &[PathBuf]) -> Result<Vec<InputFile>> {
    let mut files = Vec::new();

    for raw in paths {
        if is_remote_url(&raw.to_string_lossy()) {
            tracing::warn!("Skipping {}: remote URLs can't be transferred", raw.display());
            continue;
        }

        let path = clean_path(raw);
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        if !metadata.is_dir() {
            files.push(InputFile::from_path(&path)?);
            continue;
        }

        let walker = WalkDir::new(&path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| TransferError::io(&path, e.into()))?;
            if entry.file_type().is_file() {
                files.push(InputFile::from_path(entry.path())?);
            }
        }
    }

    Ok(files)
}

/// Sort files in transfer order
pub fn sort_inputs(files: &mut [InputFile], order: FileOrder, reverse: bool) {
    files.sort_by(|a, b| {
        let primary = match order {
            FileOrder::Name => Ordering::Equal,
            FileOrder::Size => a.size.cmp(&b.size),
            FileOrder::Modified => b.modified.cmp(&a.modified),
        };
        primary.then_with(|| a.name.cmp(&b.name))
    });

    if reverse {
        files.reverse();
    }
}

/// Decide where a downloaded file is written.
///
/// Separators in `remote_name` become `-`. The file goes inside `output`
/// when it ends with a separator or names an existing directory; otherwise
/// `output` is the file path itself.
pub fn resolve_output_path(remote_name: &str, output: &str) -> PathBuf {
    let file_name = remote_name.replace(['/', MAIN_SEPARATOR], "-");

    if output.ends_with('/') || output.ends_with(MAIN_SEPARATOR) || Path::new(output).is_dir() {
        Path::new(output).join(file_name)
    } else {
        PathBuf::from(output)
    }
}
