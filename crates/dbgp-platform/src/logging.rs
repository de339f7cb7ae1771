//! Log file helpers.
//!
//! The `tracing-subscriber` setup lives in the binary; this module only
//! prepares the file it writes to.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::PlatformError;

/// Size at which the current log file is rotated (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files kept.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

/// Create the parent directory of `log_path` if needed.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Rotate `log_path` once it reaches `max_size` bytes.
///
/// ```text
///   dbgpd.log   -> dbgpd.log.1
///   dbgpd.log.1 -> dbgpd.log.2
///   ...
///   dbgpd.log.<max_files> is deleted
/// ```
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let len = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if len < max_size || max_files == 0 {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for i in (1..max_files).rev() {
        let from = rotated_path(log_path, i);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, i + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))?;
    tracing::debug!(path = %log_path.display(), size = len, "rotated log file");
    Ok(())
}

/// Ensure the directory, rotate, then open `log_path` for appending.
pub fn open_log_file(log_path: &Path) -> Result<File, PlatformError> {
    ensure_log_dir(log_path)?;
    rotate_log_files(log_path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    Ok(file)
}

/// Map a level name (case-insensitive) to a `tracing` filter directive.
/// Unknown names map to `"info"`.
pub fn log_level_to_filter(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{index}"));
    base.with_file_name(name)
}
