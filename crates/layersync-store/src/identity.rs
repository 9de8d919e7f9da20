//! File identity and clash resolution
//!
//! Decides where an entity's snapshot lives. Names are derived from the key
//! (stable id naming) or from the sanitized alias. In a flat layout two
//! entities can sanitize to the same name; the later one gets a short hash
//! of its key appended so both files survive and the choice is
//! deterministic.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use layersync_core::model::SnapshotDocument;

use crate::snapshot::codec::read_document;

/// Length of the key hash appended to clashing names
pub const HASH_SUFFIX_LEN: usize = 8;

/// Suffix of clean marker file stems
pub const CLEAN_SUFFIX: &str = "_clean";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingOptions {
    pub use_stable_id_as_name: bool,
    pub flat_layout: bool,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            use_stable_id_as_name: false,
            flat_layout: true,
        }
    }
}

/// Lowercase ASCII alphanumerics separated by single dashes.
///
/// Falls back to the sanitized `fallback` (normally the key) when nothing
/// usable is left.
pub fn sanitize_name(alias: &str, fallback: &str) -> String {
    let sanitized = sanitize(alias);
    if sanitized.is_empty() {
        let from_fallback = sanitize(fallback);
        if from_fallback.is_empty() {
            return "entity".to_string();
        }
        return from_fallback;
    }
    sanitized
}

fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// First `HASH_SUFFIX_LEN` hex characters of the SHA-256 of `key`
pub fn key_hash_suffix(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..HASH_SUFFIX_LEN].to_string()
}

/// File stem for an entity before any clash suffix
pub fn file_stem(key: &str, alias: &str, options: NamingOptions) -> String {
    if options.use_stable_id_as_name {
        sanitize_name(key, key)
    } else {
        sanitize_name(alias, key)
    }
}

/// Path of an entity's snapshot under `type_dir`.
///
/// `ancestor_stems` are the file stems of the entity's ancestors, root
/// first; they only matter in the folder-per-parent layout.
pub fn resolve_path(
    type_dir: &Path,
    document: &SnapshotDocument,
    ancestor_stems: &[String],
    options: NamingOptions,
    extension: &str,
) -> PathBuf {
    let stem = file_stem(&document.key, &document.alias, options);

    if !options.flat_layout {
        let mut dir = type_dir.to_path_buf();
        for ancestor in ancestor_stems {
            dir.push(ancestor);
        }
        return dir.join(format!("{stem}.{extension}"));
    }

    let candidate = type_dir.join(format!("{stem}.{extension}"));
    if options.use_stable_id_as_name || !clashes_with(&candidate, document) {
        return candidate;
    }

    let suffixed = type_dir.join(format!(
        "{}_{}.{}",
        stem,
        key_hash_suffix(&document.key),
        extension
    ));
    tracing::debug!(
        entity_key = document.key.as_str(),
        file = %suffixed.display(),
        "file name clash resolved with key hash"
    );
    suffixed
}

/// Whether an existing file at `path` belongs to a different entity
fn clashes_with(path: &Path, document: &SnapshotDocument) -> bool {
    if !path.exists() {
        return false;
    }
    match read_document(path) {
        Ok(existing) => {
            existing.key != document.key
                && !(existing.alias == document.alias
                    && existing.parent_key == document.parent_key
                    && !existing.is_tombstone())
        }
        // Never overwrite a file we cannot identify
        Err(_) => true,
    }
}

/// Path of the clean marker for the children of the entity stored at
/// `parent_file`; `None` is the marker for the roots of the type.
pub fn clean_marker_path(type_dir: &Path, parent_file: Option<&Path>, extension: &str) -> PathBuf {
    match parent_file {
        Some(parent) => {
            let stem = parent
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            parent.with_file_name(format!("{stem}{CLEAN_SUFFIX}.{extension}"))
        }
        None => type_dir.join(format!("{CLEAN_SUFFIX}.{extension}")),
    }
}

/// Logical folder a clean marker applies to.
///
/// `relative_path` is the marker's path relative to its type folder. In a
/// flat layout every sibling lives in the type folder itself; otherwise the
/// children of a parent live in the folder named after the parent's stem.
pub fn clean_scope(type_folder: &Path, relative_path: &Path, flat_layout: bool) -> PathBuf {
    if flat_layout {
        return type_folder.to_path_buf();
    }

    let dir = relative_path.parent().unwrap_or_else(|| Path::new(""));
    let stem = relative_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent_stem = stem.strip_suffix(CLEAN_SUFFIX).unwrap_or(&stem);

    if parent_stem.is_empty() {
        type_folder.join(dir)
    } else {
        type_folder.join(dir).join(parent_stem)
    }
}
