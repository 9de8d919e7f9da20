//! Clean key index construction
//!
//! Collects the keys of every snapshot under one logical folder across all
//! layers. Clean markers are skipped since their keys never name a live
//! entity. Results are cached in the batch's `CleanKeyIndex`.

#![allow(clippy::result_large_err)]

use std::collections::HashSet;
use std::path::Path;

use layersync_core::context::CleanKeyIndex;
use layersync_core::model::MarkerKind;

use crate::errors::Result;
use crate::layers::LayeredFolderSet;
use crate::snapshot::codec::read_document;
use crate::snapshot::loader::snapshot_files;

/// Keys found under `logical_folder` in any root.
///
/// # Errors
///
/// Any file that cannot be read or parsed fails the whole build. The caller
/// must then delete nothing.
pub fn build_clean_keys(
    layers: &LayeredFolderSet,
    logical_folder: &Path,
    extension: &str,
) -> Result<HashSet<String>> {
    let mut keys = HashSet::new();
    for root in layers.roots() {
        for file in snapshot_files(&root.join(logical_folder), extension)? {
            let document = read_document(&file)?;
            if document.marker == Some(MarkerKind::Clean) {
                continue;
            }
            keys.insert(document.key);
        }
    }
    Ok(keys)
}

/// Cached `build_clean_keys`.
///
/// # Errors
///
/// Same as `build_clean_keys`; failures are not cached.
pub fn clean_keys(
    index: &mut CleanKeyIndex,
    layers: &LayeredFolderSet,
    logical_folder: &Path,
    extension: &str,
) -> Result<HashSet<String>> {
    if let Some(keys) = index.get(logical_folder) {
        return Ok(keys.clone());
    }

    let keys = build_clean_keys(layers, logical_folder, extension)?;
    tracing::debug!(
        folder = %logical_folder.display(),
        key_count = keys.len(),
        "clean key index built"
    );
    index.insert(logical_folder, keys.clone());
    Ok(keys)
}
