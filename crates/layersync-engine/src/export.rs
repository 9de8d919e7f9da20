//! Export
//!
//! Writes one snapshot file per live entity of every selected handler:
//! - entities in (level, sort order, alias, key) order so parents are
//!   written before children and clash suffixes are deterministic
//! - paths from the identity resolver; byte comparison decides between
//!   `Create`, `Update` and `NoChange`
//! - files of the same key at an older path are removed
//! - a clean marker for the roots and for every parent with children
//! - the version marker at the root

#![allow(clippy::result_large_err)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use layersync_core::errors::ExError;
use layersync_core::model::{Action, ChangeOutcome, LiveEntity, SnapshotDocument};
use layersync_core::store::EntityStore;
use layersync_store::atomic::{write_if_changed, WriteOutcome};
use layersync_store::errors::io_error;
use layersync_store::identity::{
    clean_marker_path, file_stem, key_hash_suffix, resolve_path, NamingOptions,
};
use layersync_store::snapshot::codec::{read_document, render_document};
use layersync_store::snapshot::loader::snapshot_files;
use layersync_store::version::write_marker;

use crate::callbacks::BatchCallbacks;
use crate::handlers::ResolvedHandler;

#[derive(Debug, Clone, Copy)]
pub struct ExportRequest<'a> {
    pub root: &'a Path,
    pub extension: &'a str,
    /// Delete each type folder before writing it
    pub wipe_type_folders: bool,
}

/// Export every handler's entities under `request.root`.
///
/// # Errors
///
/// Returns `ExErrorKind::Io` if a type folder cannot be wiped or the
/// version marker cannot be written. Failures for single entities are
/// `Fail` actions.
pub fn export_all(
    store: &dyn EntityStore,
    handlers: &[ResolvedHandler<'_>],
    request: ExportRequest<'_>,
    callbacks: &mut BatchCallbacks<'_>,
) -> Result<Vec<Action>, ExError> {
    let mut actions = Vec::new();
    let mut listed: Vec<(&ResolvedHandler<'_>, Vec<LiveEntity>)> = Vec::new();

    for handler in handlers {
        match store.all(handler.entity_type()) {
            Ok(mut entities) => {
                entities.sort_by(|a, b| {
                    a.level
                        .cmp(&b.level)
                        .then_with(|| a.sort_order.cmp(&b.sort_order))
                        .then_with(|| a.alias.cmp(&b.alias))
                        .then_with(|| a.key.cmp(&b.key))
                });
                listed.push((handler, entities));
            }
            Err(err) => actions.push(
                Action::new(
                    ChangeOutcome::Fail,
                    handler.entity_type(),
                    "",
                    handler.entity_type(),
                )
                .with_message(format!("listing live entities failed: {}", err)),
            ),
        }
    }

    if request.wipe_type_folders {
        for (handler, _) in &listed {
            let type_dir = request.root.join(&handler.folder);
            if type_dir.exists() {
                fs::remove_dir_all(&type_dir)
                    .map_err(|e| io_error("wipe_export_folder", &type_dir, e))?;
            }
        }
    }

    let total: usize = listed.iter().map(|(_, entities)| entities.len()).sum();
    let mut position = 0;
    for (handler, entities) in &listed {
        let mut writer = TypeWriter::new(handler, request);
        for entity in entities {
            actions.push(writer.write_entity(entity, entities));
            position += 1;
            callbacks.report_progress(&entity.alias, position, total);
        }
        actions.extend(writer.write_clean_markers(entities));
    }

    write_marker(request.root)?;
    Ok(actions)
}

/// Export state of one type folder
struct TypeWriter<'h, 'a> {
    handler: &'h ResolvedHandler<'a>,
    type_dir: PathBuf,
    extension: String,
    naming: NamingOptions,
    /// Files found before writing, by key
    previous: HashMap<String, Vec<PathBuf>>,
    /// Where each key was written in this run
    written: HashMap<String, PathBuf>,
    claimed: HashSet<PathBuf>,
}

impl<'h, 'a> TypeWriter<'h, 'a> {
    fn new(handler: &'h ResolvedHandler<'a>, request: ExportRequest<'_>) -> Self {
        let type_dir = request.root.join(&handler.folder);
        let previous = index_existing(&type_dir, request.extension);
        Self {
            handler,
            naming: NamingOptions {
                use_stable_id_as_name: handler.settings.use_stable_id_as_name,
                flat_layout: handler.settings.flat_layout,
            },
            type_dir,
            extension: request.extension.to_string(),
            previous,
            written: HashMap::new(),
            claimed: HashSet::new(),
        }
    }

    fn write_entity(&mut self, entity: &LiveEntity, all: &[LiveEntity]) -> Action {
        let action = Action::new(
            ChangeOutcome::NoChange,
            entity.entity_type.clone(),
            entity.key.clone(),
            entity.alias.clone(),
        );

        let document = match self.handler.registration.serializer.serialize(entity) {
            Ok(document) => document,
            Err(err) => return action.into_failure(format!("serialize failed: {}", err)),
        };
        let content = match render_document(&document) {
            Ok(content) => content,
            Err(err) => return action.into_failure(format!("render failed: {}", err)),
        };

        let (base_dir, ancestors) = self.entity_base(entity, all);
        let mut path = resolve_path(
            &base_dir,
            &document,
            &ancestors,
            self.naming,
            &self.extension,
        );
        if self.claimed.contains(&path) {
            // Two live entities resolved to one name in this run
            let stem = file_stem(&entity.key, &entity.alias, self.naming);
            path = path.with_file_name(format!(
                "{}_{}.{}",
                stem,
                key_hash_suffix(&entity.key),
                self.extension
            ));
        }

        let outcome = match write_if_changed(&path, content.as_bytes()) {
            Ok(WriteOutcome::Created) => ChangeOutcome::Create,
            Ok(WriteOutcome::Updated) => ChangeOutcome::Update,
            Ok(WriteOutcome::Unchanged) => ChangeOutcome::NoChange,
            Err(err) => return action.with_file(&path).into_failure(format!("write failed: {}", err)),
        };

        self.remove_stale(&entity.key, &path);
        self.claimed.insert(path.clone());
        self.written.insert(entity.key.clone(), path.clone());

        let mut action = action.with_file(&path);
        action.outcome = outcome;
        action
    }

    /// Folder and ancestor stems to resolve `entity`'s path from.
    ///
    /// In the nested layout a child goes into the folder named after the
    /// file its parent was actually written to, clash suffix included.
    /// Parents not written in this run fall back to their derived stems.
    fn entity_base(&self, entity: &LiveEntity, all: &[LiveEntity]) -> (PathBuf, Vec<String>) {
        if self.naming.flat_layout {
            return (self.type_dir.clone(), Vec::new());
        }
        let parent_file = entity
            .parent_key
            .as_deref()
            .and_then(|parent| self.written.get(parent));
        match parent_file {
            Some(parent_file) => (parent_file.with_extension(""), Vec::new()),
            None => (self.type_dir.clone(), ancestor_stems(entity, all, self.naming)),
        }
    }

    /// Remove files of `key` left at another path by an earlier export
    fn remove_stale(&self, key: &str, current: &Path) {
        let Some(paths) = self.previous.get(key) else {
            return;
        };
        let stale_paths = paths
            .iter()
            .filter(|p| p.as_path() != current && !self.claimed.contains(*p));
        for stale in stale_paths {
            match fs::remove_file(stale) {
                Ok(()) => tracing::debug!(
                    entity_key = key,
                    file = %stale.display(),
                    "removed stale snapshot"
                ),
                Err(err) => tracing::warn!(
                    entity_key = key,
                    file = %stale.display(),
                    error = %err,
                    "could not remove stale snapshot"
                ),
            }
        }
    }

    /// Markers for the roots and for each written parent with written
    /// children. Only failures produce actions.
    fn write_clean_markers(&self, entities: &[LiveEntity]) -> Vec<Action> {
        let entity_type = self.handler.entity_type();
        let mut markers: BTreeMap<PathBuf, SnapshotDocument> = BTreeMap::new();

        let aliases: HashMap<&str, &str> = entities
            .iter()
            .map(|e| (e.key.as_str(), e.alias.as_str()))
            .collect();

        for entity in entities.iter().filter(|e| self.written.contains_key(&e.key)) {
            match entity.parent_key.as_deref() {
                None => {
                    let path = clean_marker_path(&self.type_dir, None, &self.extension);
                    markers
                        .entry(path)
                        .or_insert_with(|| SnapshotDocument::clean_marker(entity_type, None, None));
                }
                Some(parent) => {
                    let Some(parent_file) = self.written.get(parent) else {
                        continue;
                    };
                    let path = clean_marker_path(&self.type_dir, Some(parent_file), &self.extension);
                    markers.entry(path).or_insert_with(|| {
                        SnapshotDocument::clean_marker(
                            entity_type,
                            Some(parent),
                            aliases.get(parent).copied(),
                        )
                    });
                }
            }
        }

        let mut failures = Vec::new();
        for (path, marker) in &markers {
            let written = render_document(marker)
                .and_then(|content| write_if_changed(path, content.as_bytes()));
            if let Err(err) = written {
                failures.push(
                    Action::new(
                        ChangeOutcome::Fail,
                        entity_type,
                        marker.key.clone(),
                        marker.alias.clone(),
                    )
                    .with_file(path)
                    .with_message(format!("clean marker write failed: {}", err)),
                );
            }
        }
        tracing::debug!(
            entity_type,
            marker_count = markers.len(),
            "clean markers written"
        );
        failures
    }
}

/// Keys of readable, non-tombstone snapshots already in `type_dir`
fn index_existing(type_dir: &Path, extension: &str) -> HashMap<String, Vec<PathBuf>> {
    let files = match snapshot_files(type_dir, extension) {
        Ok(files) => files,
        Err(err) => {
            tracing::warn!(
                folder = %type_dir.display(),
                err_code = err.code(),
                "existing snapshots could not be listed"
            );
            return HashMap::new();
        }
    };

    let mut by_key: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for file in files {
        if let Ok(document) = read_document(&file) {
            if !document.is_tombstone() {
                by_key.entry(document.key).or_default().push(file);
            }
        }
    }
    by_key
}

/// Stems of `entity`'s ancestors, root first
fn ancestor_stems(entity: &LiveEntity, all: &[LiveEntity], naming: NamingOptions) -> Vec<String> {
    let by_key: HashMap<&str, &LiveEntity> = all.iter().map(|e| (e.key.as_str(), e)).collect();
    let mut stems = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut cursor = entity.parent_key.as_deref();

    while let Some(key) = cursor {
        if !visited.insert(key) {
            tracing::warn!(entity_key = entity.key.as_str(), "parent chain loops; truncating path");
            break;
        }
        let Some(parent) = by_key.get(key) else {
            break;
        };
        stems.push(file_stem(&parent.key, &parent.alias, naming));
        cursor = parent.parent_key.as_deref();
    }

    stems.reverse();
    stems
}
