//! Error handling for layersync-store
//!
//! Wraps layersync-core ExError with store-specific helpers

use layersync_core::errors::{ExError, ExErrorKind, SyncError};
use std::path::Path;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create an IO error
pub fn io_error(operation: &str, path: &Path, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_path(path)
        .with_message(err.to_string())
}

/// Create a snapshot parse error
pub fn snapshot_parse(path: &Path, reason: impl Into<String>) -> ExError {
    ExError::from(SyncError::InvalidSnapshot {
        path: path.display().to_string(),
        reason: reason.into(),
    })
    .with_op("parse_snapshot")
}

/// Create a version mismatch error
pub fn version_mismatch(root: &Path, expected: u32, found: u32) -> ExError {
    ExError::from(SyncError::VersionMismatch {
        root: root.display().to_string(),
        expected,
        found,
    })
    .with_op("check_version")
}
