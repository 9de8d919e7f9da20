//! Per-batch state
//!
//! A `BatchContext` is created when a top-level batch starts and dropped
//! when it ends. It owns the clean key cache, so the cache can never outlive
//! the batch, even when the batch fails part way.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use layersync_core_types::{BatchId, BatchKind};

/// Keys found in snapshot files per logical folder, across every layer
///
/// Logical folders are relative to the roots, e.g. `content/home`.
#[derive(Debug, Default)]
pub struct CleanKeyIndex {
    entries: HashMap<PathBuf, HashSet<String>>,
}

impl CleanKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, folder: &Path) -> Option<&HashSet<String>> {
        self.entries.get(folder)
    }

    pub fn insert(&mut self, folder: impl Into<PathBuf>, keys: HashSet<String>) {
        self.entries.insert(folder.into(), keys);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// State for one report, import or export
#[derive(Debug)]
pub struct BatchContext {
    batch_id: BatchId,
    kind: BatchKind,
    clean_index: CleanKeyIndex,
    started: Instant,
}

impl BatchContext {
    pub fn begin(kind: BatchKind) -> Self {
        Self {
            batch_id: BatchId::new(),
            kind,
            clean_index: CleanKeyIndex::new(),
            started: Instant::now(),
        }
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn clean_index(&self) -> &CleanKeyIndex {
        &self.clean_index
    }

    pub fn clean_index_mut(&mut self) -> &mut CleanKeyIndex {
        &mut self.clean_index
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Drop for BatchContext {
    fn drop(&mut self) {
        self.clean_index.clear();
    }
}
