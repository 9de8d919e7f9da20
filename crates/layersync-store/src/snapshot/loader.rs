//! Recursive snapshot folder loader
//!
//! Walks a type folder in file-name order and parses every file with the
//! snapshot extension. A file that fails to parse does not stop the scan;
//! it is returned as a `LoadFailure` so the batch can report it.

#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use layersync_core::model::{Action, ChangeOutcome, EntityRecord};
use layersync_core::ExError;

use crate::errors::{io_error, Result};
use crate::snapshot::codec::read_document;

/// A file that could not be turned into a record
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: ExError,
}

impl LoadFailure {
    pub fn to_action(&self, entity_type: &str) -> Action {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Action::new(ChangeOutcome::Fail, entity_type, "", name)
            .with_file(&self.path)
            .with_message(self.error.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadedFolder {
    pub records: Vec<EntityRecord>,
    pub failures: Vec<LoadFailure>,
}

/// Snapshot files under `folder`, sorted by path.
///
/// A missing folder yields no files.
///
/// # Errors
///
/// Returns `ExErrorKind::Io` if the folder exists but cannot be walked.
pub fn snapshot_files(folder: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(folder)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(folder).to_path_buf();
            match e.into_io_error() {
                Some(io) => io_error("scan_folder", &path, io),
                None => io_error(
                    "scan_folder",
                    &path,
                    std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop"),
                ),
            }
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Load every snapshot file under `folder`.
///
/// Records carry their path relative to `folder`.
///
/// # Errors
///
/// Returns `ExErrorKind::Io` if the folder cannot be walked. Unreadable or
/// invalid files are reported in `failures` instead.
pub fn load_folder(folder: &Path, extension: &str) -> Result<LoadedFolder> {
    let mut loaded = LoadedFolder::default();

    for path in snapshot_files(folder, extension)? {
        match read_document(&path) {
            Ok(document) => {
                let relative = path.strip_prefix(folder).unwrap_or(&path).to_path_buf();
                loaded
                    .records
                    .push(EntityRecord::from_document(document, path.clone(), relative));
            }
            Err(error) => {
                tracing::warn!(
                    file = %path.display(),
                    err_code = error.code(),
                    "skipping unreadable snapshot"
                );
                loaded.failures.push(LoadFailure { path, error });
            }
        }
    }

    tracing::debug!(
        folder = %folder.display(),
        record_count = loaded.records.len(),
        failure_count = loaded.failures.len(),
        "folder loaded"
    );
    Ok(loaded)
}
