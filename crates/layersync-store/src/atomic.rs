//! Atomic write primitives
//!
//! Uses temp→rename pattern to ensure no partial writes

#![allow(clippy::result_large_err)]

use crate::errors::{io_error, Result};
use std::fs;
use std::path::Path;

/// What a write did to the file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    /// Existing bytes were identical; nothing written
    Unchanged,
}

/// Atomically write bytes to a file
///
/// Uses temp file + rename to ensure atomic write
///
/// # Errors
///
/// Returns `ExErrorKind::Io` if any filesystem step fails.
pub fn atomic_write(target_path: &Path, content: &[u8]) -> Result<()> {
    // Create parent directory if it doesn't exist
    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("create_snapshot_dir", parent, e))?;
    }

    // Create temp file in the same directory
    let temp_path = target_path.with_extension("tmp");

    fs::write(&temp_path, content).map_err(|e| io_error("write_snapshot_temp", &temp_path, e))?;

    fs::rename(&temp_path, target_path)
        .map_err(|e| io_error("rename_snapshot_temp", target_path, e))?;

    Ok(())
}

/// Write only when the content differs from what is on disk
///
/// # Errors
///
/// Returns `ExErrorKind::Io` if the existing file cannot be read or the
/// write fails.
pub fn write_if_changed(target_path: &Path, content: &[u8]) -> Result<WriteOutcome> {
    match fs::read(target_path) {
        Ok(existing) if existing == content => return Ok(WriteOutcome::Unchanged),
        Ok(_) => {
            atomic_write(target_path, content)?;
            return Ok(WriteOutcome::Updated);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_error("read_snapshot", target_path, e)),
    }

    atomic_write(target_path, content)?;
    Ok(WriteOutcome::Created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parent() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("content").join("home.config");

        atomic_write(&target, b"nested").unwrap();

        let content = fs::read(&target).unwrap();
        assert_eq!(content, b"nested");
    }

    #[test]
    fn test_no_tmp_files_after_write() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("home.config");

        atomic_write(&target, b"clean").unwrap();

        let tmp_count = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(|s| s.ends_with(".tmp"))
                    .unwrap_or(false)
            })
            .count();

        assert_eq!(tmp_count, 0);
    }

    #[test]
    fn test_write_if_changed_outcomes() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("home.config");

        assert_eq!(write_if_changed(&target, b"one").unwrap(), WriteOutcome::Created);
        assert_eq!(write_if_changed(&target, b"one").unwrap(), WriteOutcome::Unchanged);
        assert_eq!(write_if_changed(&target, b"two").unwrap(), WriteOutcome::Updated);
        assert_eq!(fs::read(&target).unwrap(), b"two");
    }
}
