//! Clean reconciler
//!
//! Removes live entities that no longer have a snapshot file in any layer.
//! A scope names the logical folder whose keys count as present and the
//! live entities to check against them. If the key index cannot be built,
//! or comes back empty, nothing is deleted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use layersync_core::capability::{CleanProcessor, CleanTarget};
use layersync_core::context::CleanKeyIndex;
use layersync_core::model::{Action, ChangeOutcome, EntityRecord, LiveEntity};
use layersync_core::store::EntityStore;
use layersync_store::clean_index::clean_keys;
use layersync_store::identity::clean_scope;
use layersync_store::layers::LayeredFolderSet;

/// What one clean pass looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanScope<'a> {
    pub entity_type: &'a str,
    /// Folder relative to the roots, e.g. `content/home`
    pub logical_folder: PathBuf,
    pub target: CleanTarget<'a>,
}

impl<'a> CleanScope<'a> {
    /// Scope of a clean marker: the marker's parent's children, checked
    /// against the folder those children are exported to.
    pub fn for_marker(type_folder: &str, marker: &'a EntityRecord, flat_layout: bool) -> Self {
        Self {
            entity_type: &marker.entity_type,
            logical_folder: clean_scope(Path::new(type_folder), &marker.relative_path, flat_layout),
            target: CleanTarget::ChildrenOf(marker.parent_key.as_deref()),
        }
    }

    /// Every live entity of the type against the whole type folder
    pub fn whole_type(entity_type: &'a str, type_folder: &str) -> Self {
        Self {
            entity_type,
            logical_folder: PathBuf::from(type_folder),
            target: CleanTarget::AllOfType,
        }
    }
}

/// Where a clean pass reads snapshot keys from
#[derive(Debug, Clone, Copy)]
pub struct CleanSource<'a> {
    pub layers: &'a LayeredFolderSet,
    pub extension: &'a str,
}

/// Live entities in `scope` that have no snapshot, deepest first.
///
/// Never fails: index or store problems are logged and yield no candidates.
pub fn plan_clean(
    store: &dyn EntityStore,
    cleaner: &dyn CleanProcessor,
    index: &mut CleanKeyIndex,
    source: CleanSource<'_>,
    scope: &CleanScope<'_>,
) -> Vec<LiveEntity> {
    let keys = match clean_keys(index, source.layers, &scope.logical_folder, source.extension) {
        Ok(keys) => keys,
        Err(err) => {
            tracing::warn!(
                entity_type = scope.entity_type,
                folder = %scope.logical_folder.display(),
                err_code = err.code(),
                "clean skipped: key index could not be built"
            );
            return Vec::new();
        }
    };

    if keys.is_empty() {
        tracing::warn!(
            entity_type = scope.entity_type,
            folder = %scope.logical_folder.display(),
            "clean skipped: no snapshot keys found"
        );
        return Vec::new();
    }

    let candidates = match cleaner.clean_candidates(store, scope.entity_type, scope.target) {
        Ok(candidates) => candidates,
        Err(err) => {
            tracing::warn!(
                entity_type = scope.entity_type,
                err_code = err.code(),
                "clean skipped: live entities could not be listed"
            );
            return Vec::new();
        }
    };

    let mut missing: Vec<LiveEntity> = candidates
        .into_iter()
        .filter(|entity| !keys.contains(&entity.key))
        .collect();
    missing.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.key.cmp(&b.key)));

    tracing::debug!(
        entity_type = scope.entity_type,
        folder = %scope.logical_folder.display(),
        key_count = keys.len(),
        missing = missing.len(),
        "clean planned"
    );
    missing
}

/// Pending `Delete` actions for a report
pub fn pending_deletes(candidates: &[LiveEntity]) -> Vec<Action> {
    candidates
        .iter()
        .map(|entity| {
            Action::new(
                ChangeOutcome::Delete,
                entity.entity_type.clone(),
                entity.key.clone(),
                entity.alias.clone(),
            )
            .with_message("no snapshot file; would be removed by clean")
        })
        .collect()
}

/// Remove `candidates` through the cleaner.
///
/// Entities already gone, e.g. removed with an earlier candidate's subtree,
/// produce no action. Store failures become `Fail` actions.
pub fn apply_clean(
    store: &mut dyn EntityStore,
    cleaner: &dyn CleanProcessor,
    candidates: &[LiveEntity],
) -> Vec<Action> {
    let mut actions = Vec::new();
    for entity in candidates {
        let action = Action::new(
            ChangeOutcome::Delete,
            entity.entity_type.clone(),
            entity.key.clone(),
            entity.alias.clone(),
        );
        match cleaner.remove(store, entity) {
            Ok(true) => actions.push(action.with_message("removed by clean")),
            Ok(false) => {}
            Err(err) => actions.push(action.into_failure(format!("clean failed: {}", err))),
        }
    }
    actions
}

/// Plan and then apply or report one clean scope
pub fn reconcile(
    store: &mut dyn EntityStore,
    cleaner: &dyn CleanProcessor,
    index: &mut CleanKeyIndex,
    source: CleanSource<'_>,
    scope: &CleanScope<'_>,
    report_only: bool,
) -> Vec<Action> {
    let candidates = plan_clean(&*store, cleaner, index, source, scope);
    if report_only {
        pending_deletes(&candidates)
    } else {
        apply_clean(store, cleaner, &candidates)
    }
}

/// Drop actions whose key was already handled by an earlier clean scope
pub(crate) fn dedup_by_key(actions: Vec<Action>, seen: &mut HashSet<String>) -> Vec<Action> {
    actions
        .into_iter()
        .filter(|a| a.is_failure() || seen.insert(a.key.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use layersync_core::capability::DefaultCleanProcessor;
    use layersync_core::model::SnapshotDocument;
    use layersync_core::store::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, file: &str, xml: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(file), xml).unwrap();
    }

    fn store_with(keys: &[(&str, Option<&str>, i32)]) -> MemoryStore {
        let mut store = MemoryStore::new();
        for (key, parent, level) in keys {
            let mut entity = LiveEntity::new("content", *key, key.to_uppercase());
            entity.parent_key = parent.map(str::to_string);
            entity.level = *level;
            store.insert(entity);
        }
        store
    }

    #[test]
    fn test_missing_children_are_removed() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("content"), "a.config", r#"<Entity Type="content" Key="a" Alias="A" />"#);
        let layers = LayeredFolderSet::new([temp.path()]);
        let mut store = store_with(&[("a", None, 0), ("b", None, 0), ("b1", Some("b"), 1)]);
        let mut index = CleanKeyIndex::new();

        let scope = CleanScope::whole_type("content", "content");
        let source = CleanSource {
            layers: &layers,
            extension: "config",
        };
        let actions = reconcile(&mut store, &DefaultCleanProcessor, &mut index, source, &scope, false);

        // b1 goes first, then b finds nothing left below it
        let keys: Vec<&str> = actions.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["b1", "b"]);
        assert_eq!(store.len("content"), 1);
    }

    #[test]
    fn test_zero_keys_deletes_nothing() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("content")).unwrap();
        let layers = LayeredFolderSet::new([temp.path()]);
        let mut store = store_with(&[("a", None, 0), ("b", None, 0)]);
        let mut index = CleanKeyIndex::new();

        let actions = reconcile(
            &mut store,
            &DefaultCleanProcessor,
            &mut index,
            CleanSource {
                layers: &layers,
                extension: "config",
            },
            &CleanScope::whole_type("content", "content"),
            false,
        );

        assert!(actions.is_empty());
        assert_eq!(store.len("content"), 2);
    }

    #[test]
    fn test_unreadable_snapshot_deletes_nothing() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("content");
        write(&folder, "a.config", r#"<Entity Type="content" Key="a" Alias="A" />"#);
        write(&folder, "broken.config", "<Entity Type=");
        let layers = LayeredFolderSet::new([temp.path()]);
        let mut store = store_with(&[("a", None, 0), ("b", None, 0)]);
        let mut index = CleanKeyIndex::new();

        let actions = reconcile(
            &mut store,
            &DefaultCleanProcessor,
            &mut index,
            CleanSource {
                layers: &layers,
                extension: "config",
            },
            &CleanScope::whole_type("content", "content"),
            false,
        );

        assert!(actions.is_empty());
        assert_eq!(store.len("content"), 2);
    }

    #[test]
    fn test_report_only_leaves_store_untouched() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("content"), "a.config", r#"<Entity Type="content" Key="a" Alias="A" />"#);
        let layers = LayeredFolderSet::new([temp.path()]);
        let mut store = store_with(&[("a", None, 0), ("b", None, 0)]);
        let mut index = CleanKeyIndex::new();

        let actions = reconcile(
            &mut store,
            &DefaultCleanProcessor,
            &mut index,
            CleanSource {
                layers: &layers,
                extension: "config",
            },
            &CleanScope::whole_type("content", "content"),
            true,
        );

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].outcome, ChangeOutcome::Delete);
        assert_eq!(store.len("content"), 2);
    }

    #[test]
    fn test_marker_scope_in_nested_layout() {
        let temp = TempDir::new().unwrap();
        let type_dir = temp.path().join("content");
        write(&type_dir, "home.config", r#"<Entity Type="content" Key="home" Alias="Home" />"#);
        write(
            &type_dir.join("home"),
            "about.config",
            r#"<Entity Type="content" Key="about" Alias="About" Parent="home" Level="1" />"#,
        );
        let layers = LayeredFolderSet::new([temp.path()]);
        let mut store = store_with(&[
            ("home", None, 0),
            ("about", Some("home"), 1),
            ("stale", Some("home"), 1),
        ]);
        let mut index = CleanKeyIndex::new();

        let marker_doc = SnapshotDocument::clean_marker("content", Some("home"), Some("Home"));
        let marker = EntityRecord::from_document(
            marker_doc,
            type_dir.join("home_clean.config"),
            "home_clean.config",
        );
        let scope = CleanScope::for_marker("content", &marker, false);
        assert_eq!(scope.logical_folder, PathBuf::from("content/home"));

        let actions = reconcile(
            &mut store,
            &DefaultCleanProcessor,
            &mut index,
            CleanSource {
                layers: &layers,
                extension: "config",
            },
            &scope,
            false,
        );

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].key, "stale");
        assert_eq!(store.len("content"), 2);
    }
}
