//! Per-root snapshot format marker
//!
//! Export writes `layersync.version` at the top of every root it writes to.
//! Import and report refuse roots written with another format version
//! before touching the live store.

#![allow(clippy::result_large_err)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use layersync_core::{ExError, ExErrorKind};

use crate::atomic::atomic_write;
use crate::errors::{io_error, version_mismatch, Result};

/// Snapshot format written by this build
pub const FORMAT_VERSION: u32 = 1;

pub const MARKER_FILE: &str = "layersync.version";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionMarker {
    pub format: u32,
    /// Version of the engine that wrote the root
    pub engine: String,
    pub exported_at: DateTime<Utc>,
}

impl VersionMarker {
    pub fn current() -> Self {
        Self {
            format: FORMAT_VERSION,
            engine: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VersionCheck {
    Matched(VersionMarker),
    /// No marker; accepted with a warning
    Missing,
}

/// Read the marker of `root`, if any.
///
/// # Errors
///
/// Returns `ExErrorKind::Io` if the marker exists but cannot be read, or
/// `ExErrorKind::Serialization` if it is not valid TOML.
pub fn read_marker(root: &Path) -> Result<Option<VersionMarker>> {
    let path = root.join(MARKER_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error("read_version_marker", &path, e)),
    };

    toml::from_str(&content).map(Some).map_err(|e| {
        ExError::new(ExErrorKind::Serialization)
            .with_op("read_version_marker")
            .with_path(&path)
            .with_message(e.to_string())
    })
}

/// Write the current marker to `root`.
///
/// # Errors
///
/// Returns `ExErrorKind::Io` if the marker cannot be written.
pub fn write_marker(root: &Path) -> Result<VersionMarker> {
    let marker = VersionMarker::current();
    let content = toml::to_string_pretty(&marker).map_err(|e| {
        ExError::new(ExErrorKind::Serialization)
            .with_op("write_version_marker")
            .with_message(e.to_string())
    })?;
    atomic_write(&root.join(MARKER_FILE), content.as_bytes())?;
    Ok(marker)
}

/// Check that `root` was written with `FORMAT_VERSION`.
///
/// # Errors
///
/// Returns `ExErrorKind::VersionMismatch` for another format, plus the
/// errors of `read_marker`.
pub fn check_root(root: &Path) -> Result<VersionCheck> {
    match read_marker(root)? {
        Some(marker) if marker.format == FORMAT_VERSION => Ok(VersionCheck::Matched(marker)),
        Some(marker) => Err(version_mismatch(root, FORMAT_VERSION, marker.format)),
        None => {
            tracing::warn!(root = %root.display(), "snapshot root has no version marker");
            Ok(VersionCheck::Missing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_written_marker_matches() {
        let temp = TempDir::new().unwrap();
        let written = write_marker(temp.path()).unwrap();

        match check_root(temp.path()).unwrap() {
            VersionCheck::Matched(marker) => assert_eq!(marker.format, written.format),
            VersionCheck::Missing => panic!("marker should exist"),
        }
    }

    #[test]
    fn test_missing_marker_is_accepted() {
        let temp = TempDir::new().unwrap();
        assert_eq!(check_root(temp.path()).unwrap(), VersionCheck::Missing);
    }

    #[test]
    fn test_other_format_is_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(MARKER_FILE),
            "format = 99\nengine = \"9.0.0\"\nexported_at = \"2026-01-01T00:00:00Z\"\n",
        )
        .unwrap();

        let err = check_root(temp.path()).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::VersionMismatch);
    }

    #[test]
    fn test_garbage_marker_is_serialization_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(MARKER_FILE), "not = [toml").unwrap();

        let err = read_marker(temp.path()).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Serialization);
    }
}
