//! Layered snapshot folders
//!
//! Several roots are read as one logical snapshot. Roots later in the list
//! have priority: a record found in a later root replaces the record with
//! the same key from an earlier root, or is merged with it field by field
//! when the type has a `LayerMerger`. The merged set is then put through
//! the graph orderer.

#![allow(clippy::result_large_err)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use layersync_core::capability::LayerMerger;
use layersync_core::model::{Action, ChangeOutcome, EntityRecord};
use layersync_core::ordering::{order_records, OrderStrategy};

use crate::errors::Result;
use crate::snapshot::loader::load_folder;

/// Ordered list of snapshot roots, lowest priority first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayeredFolderSet {
    roots: Vec<PathBuf>,
}

/// What to read from each root
#[derive(Clone, Copy)]
pub struct LayerRequest<'a> {
    /// Folder under each root holding one entity type
    pub type_folder: &'a str,
    pub extension: &'a str,
    /// Records of any other type are reported as failures
    pub entity_type: Option<&'a str>,
    pub merger: Option<&'a dyn LayerMerger>,
}

impl<'a> LayerRequest<'a> {
    pub fn new(type_folder: &'a str, extension: &'a str) -> Self {
        Self {
            type_folder,
            extension,
            entity_type: None,
            merger: None,
        }
    }

    pub fn with_entity_type(mut self, entity_type: &'a str) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    pub fn with_merger(mut self, merger: Option<&'a dyn LayerMerger>) -> Self {
        self.merger = merger;
        self
    }
}

/// One record of the merged view, with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedNodeInfo {
    pub record: EntityRecord,
    /// Index of the root that supplied the winning record
    pub layer: usize,
    pub root: PathBuf,
    /// Earlier layers that also carried this key
    pub overridden_layers: Vec<usize>,
}

impl OrderedNodeInfo {
    pub fn is_overridden(&self) -> bool {
        !self.overridden_layers.is_empty()
    }
}

/// Zero-based page of the ordered sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub size: usize,
}

impl Page {
    pub fn new(number: usize, size: usize) -> Self {
        Self { number, size }
    }
}

#[derive(Debug, Clone)]
pub struct MergeResult {
    pub nodes: Vec<OrderedNodeInfo>,
    /// Unreadable files, duplicate keys and failed merges
    pub failures: Vec<Action>,
    pub strategy: OrderStrategy,
    /// Node count before pagination
    pub total: usize,
}

impl LayeredFolderSet {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Load, dedup and order every record of one type folder.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Io` if a root's type folder exists but cannot
    /// be scanned. Problems with individual files are in `failures`.
    pub fn merge(&self, request: &LayerRequest<'_>) -> Result<MergeResult> {
        let mut merged: BTreeMap<String, OrderedNodeInfo> = BTreeMap::new();
        let mut poisoned: HashSet<String> = HashSet::new();
        let mut failures = Vec::new();
        let fail_type = request.entity_type.unwrap_or(request.type_folder);

        for (layer, root) in self.roots.iter().enumerate() {
            let folder = root.join(request.type_folder);
            let loaded = load_folder(&folder, request.extension)?;

            failures.extend(loaded.failures.iter().map(|f| f.to_action(fail_type)));

            let records = self.accepted_records(loaded.records, request, &mut failures);
            let (unique, duplicates) = split_duplicates(records);
            for (key, files) in duplicates {
                failures.extend(duplicate_actions(fail_type, &key, &files));
                poisoned.insert(key);
            }

            for record in unique {
                if poisoned.contains(&record.key) {
                    continue;
                }
                self.overlay(&mut merged, &mut poisoned, &mut failures, request, layer, root, record);
            }
        }

        for key in &poisoned {
            merged.remove(key);
        }

        let records: Vec<EntityRecord> = merged.values().map(|n| n.record.clone()).collect();
        let ordering = order_records(&records);

        let nodes: Vec<OrderedNodeInfo> = ordering
            .keys
            .iter()
            .filter_map(|key| merged.remove(key))
            .collect();

        tracing::debug!(
            type_folder = request.type_folder,
            layer_count = self.roots.len(),
            record_count = nodes.len(),
            failure_count = failures.len(),
            strategy = ?ordering.strategy,
            "layers merged"
        );

        Ok(MergeResult {
            total: nodes.len(),
            nodes,
            failures,
            strategy: ordering.strategy,
        })
    }

    /// One page of `merge`. Failures are reported with the first page only.
    ///
    /// # Errors
    ///
    /// Same as `merge`.
    pub fn merge_page(&self, request: &LayerRequest<'_>, page: Page) -> Result<MergeResult> {
        let mut result = self.merge(request)?;
        let start = page.number.saturating_mul(page.size);
        result.nodes = result
            .nodes
            .into_iter()
            .skip(start)
            .take(page.size)
            .collect();
        if page.number > 0 {
            result.failures.clear();
        }
        Ok(result)
    }

    fn accepted_records(
        &self,
        records: Vec<EntityRecord>,
        request: &LayerRequest<'_>,
        failures: &mut Vec<Action>,
    ) -> Vec<EntityRecord> {
        let Some(expected) = request.entity_type else {
            return records;
        };
        records
            .into_iter()
            .filter(|record| {
                if record.entity_type == expected {
                    return true;
                }
                failures.push(
                    Action::new(
                        ChangeOutcome::Fail,
                        expected,
                        record.key.clone(),
                        record.alias.clone(),
                    )
                    .with_file(&record.source_file)
                    .with_message(format!(
                        "file holds a {} entity, expected {}",
                        record.entity_type, expected
                    )),
                );
                false
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn overlay(
        &self,
        merged: &mut BTreeMap<String, OrderedNodeInfo>,
        poisoned: &mut HashSet<String>,
        failures: &mut Vec<Action>,
        request: &LayerRequest<'_>,
        layer: usize,
        root: &Path,
        record: EntityRecord,
    ) {
        let Some(previous) = merged.remove(&record.key) else {
            merged.insert(
                record.key.clone(),
                OrderedNodeInfo {
                    record,
                    layer,
                    root: root.to_path_buf(),
                    overridden_layers: Vec::new(),
                },
            );
            return;
        };

        let mut overridden_layers = previous.overridden_layers;
        overridden_layers.push(previous.layer);

        let winner = match request.merger {
            None => record,
            Some(merger) => match merger.merge(previous.record.document(), record.document()) {
                Ok(document) => EntityRecord::from_document(
                    document,
                    record.source_file.clone(),
                    record.relative_path.clone(),
                )
                .into_merged(),
                Err(err) => {
                    failures.push(
                        Action::new(
                            ChangeOutcome::Fail,
                            record.entity_type.clone(),
                            record.key.clone(),
                            record.alias.clone(),
                        )
                        .with_file(&record.source_file)
                        .with_message(format!("layer merge failed: {}", err)),
                    );
                    poisoned.insert(record.key);
                    return;
                }
            },
        };

        merged.insert(
            winner.key.clone(),
            OrderedNodeInfo {
                record: winner,
                layer,
                root: root.to_path_buf(),
                overridden_layers,
            },
        );
    }
}

/// Separate records whose key appears in more than one file of one layer
fn split_duplicates(records: Vec<EntityRecord>) -> (Vec<EntityRecord>, Vec<(String, Vec<PathBuf>)>) {
    let mut counts: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for record in &records {
        counts
            .entry(record.key.clone())
            .or_default()
            .push(record.source_file.clone());
    }

    let mut duplicates: Vec<(String, Vec<PathBuf>)> = counts
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .collect();
    duplicates.sort_by(|a, b| a.0.cmp(&b.0));

    let duplicate_keys: HashSet<&str> = duplicates.iter().map(|(k, _)| k.as_str()).collect();
    let unique = records
        .into_iter()
        .filter(|r| !duplicate_keys.contains(r.key.as_str()))
        .collect();

    (unique, duplicates)
}

fn duplicate_actions(entity_type: &str, key: &str, files: &[PathBuf]) -> Vec<Action> {
    let listing = files
        .iter()
        .map(|f| f.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    files
        .iter()
        .map(|file| {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Action::new(ChangeOutcome::Fail, entity_type, key, name)
                .with_file(file)
                .with_message(format!("key {} found in more than one file: {}", key, listing))
        })
        .collect()
}
