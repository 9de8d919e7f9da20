#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use layersync_core::model::SnapshotDocument;
use layersync_store::snapshot::codec::render_document;

/// Write `document` to `<root>/<relative>` through the codec
pub fn write_document(root: &Path, relative: &str, document: &SnapshotDocument) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, render_document(document).unwrap()).unwrap();
    path
}

pub fn content(key: &str, alias: &str) -> SnapshotDocument {
    SnapshotDocument::new("content", key, alias)
}

pub fn child(key: &str, alias: &str, parent: &str, level: i32) -> SnapshotDocument {
    let mut doc = content(key, alias);
    doc.parent_key = Some(parent.to_string());
    doc.level = level;
    doc
}
