//! Per-type capability interfaces.
//!
//! A `HandlerRegistration` binds an entity type to its serializer plus the
//! optional capabilities the engine discovers through its `Option` fields.

use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::ExError;
use crate::model::{Action, FieldChange, LiveEntity, SnapshotDocument};
use crate::store::EntityStore;

/// Converts between snapshot documents and live entities of one type
#[allow(clippy::result_large_err)]
pub trait Serializer: Send + Sync {
    fn entity_type(&self) -> &str;

    /// Whether references must be resolved in a second pass
    fn is_two_pass(&self) -> bool {
        false
    }

    /// Produce the snapshot content for a live entity.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Serialization` if the entity cannot be expressed.
    fn serialize(&self, entity: &LiveEntity) -> Result<SnapshotDocument, ExError>;

    /// Apply the local (first pass) content of a document.
    ///
    /// `existing` is the live entity the document matched, if any.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Serialization` for malformed content.
    fn deserialize(
        &self,
        document: &SnapshotDocument,
        existing: Option<&LiveEntity>,
        store: &dyn EntityStore,
    ) -> Result<LiveEntity, ExError>;

    /// Resolve forward references once every first pass has run.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::ReferenceUnresolved` when a target is still
    /// missing.
    fn deserialize_second_pass(
        &self,
        _document: &SnapshotDocument,
        entity: LiveEntity,
        _store: &dyn EntityStore,
    ) -> Result<LiveEntity, ExError> {
        Ok(entity)
    }

    /// Differences between a document and the live entity; empty when equal
    fn compare(&self, document: &SnapshotDocument, live: &LiveEntity) -> Vec<FieldChange>;
}

/// Runs once per type after every pass of an import has finished
#[allow(clippy::result_large_err)]
pub trait PostImportProcessor: Send + Sync {
    /// Returns any extra actions produced by the processor.
    ///
    /// # Errors
    ///
    /// Any error is reported as a `Fail` action for the type.
    fn post_import(
        &self,
        store: &mut dyn EntityStore,
        roots: &[PathBuf],
        actions: &[Action],
    ) -> Result<Vec<Action>, ExError>;
}

/// Which live entities a clean pass considers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanTarget<'a> {
    /// Direct children of a parent (`None` for the roots of the type)
    ChildrenOf(Option<&'a str>),
    AllOfType,
}

/// Finds and removes live entities that have no snapshot file
#[allow(clippy::result_large_err)]
pub trait CleanProcessor: Send + Sync {
    /// # Errors
    ///
    /// Propagates store read failures.
    fn clean_candidates(
        &self,
        store: &dyn EntityStore,
        entity_type: &str,
        target: CleanTarget<'_>,
    ) -> Result<Vec<LiveEntity>, ExError>;

    /// Remove an entity and everything below it, deepest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn remove(&self, store: &mut dyn EntityStore, entity: &LiveEntity) -> Result<bool, ExError> {
        let mut subtree = vec![entity.clone()];
        let mut cursor = 0;
        while cursor < subtree.len() {
            let key = subtree[cursor].key.clone();
            subtree.extend(store.children(&entity.entity_type, Some(&key))?);
            cursor += 1;
        }
        for descendant in subtree.iter().skip(1).rev() {
            store.delete(&descendant.entity_type, &descendant.key)?;
        }
        store.delete(&entity.entity_type, &entity.key)
    }
}

/// Clean processor that uses the store's parent relationships as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCleanProcessor;

impl CleanProcessor for DefaultCleanProcessor {
    fn clean_candidates(
        &self,
        store: &dyn EntityStore,
        entity_type: &str,
        target: CleanTarget<'_>,
    ) -> Result<Vec<LiveEntity>, ExError> {
        match target {
            CleanTarget::ChildrenOf(parent) => store.children(entity_type, parent),
            CleanTarget::AllOfType => store.all(entity_type),
        }
    }
}

/// Combines the same entity found in two layers
#[allow(clippy::result_large_err)]
pub trait LayerMerger: Send + Sync {
    /// `later` comes from the higher priority layer.
    ///
    /// # Errors
    ///
    /// A failed merge is reported as a `Fail` action for the key.
    fn merge(
        &self,
        earlier: &SnapshotDocument,
        later: &SnapshotDocument,
    ) -> Result<SnapshotDocument, ExError>;
}

/// Keeps fields and references of the earlier layer unless the later layer
/// sets them; identity and structure always come from the later layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldOverlayMerger;

impl LayerMerger for FieldOverlayMerger {
    fn merge(
        &self,
        earlier: &SnapshotDocument,
        later: &SnapshotDocument,
    ) -> Result<SnapshotDocument, ExError> {
        // A tombstone in either layer is never blended
        if earlier.is_tombstone() || later.is_tombstone() {
            return Ok(later.clone());
        }

        let mut merged = later.clone();
        for (name, value) in &earlier.fields {
            merged
                .fields
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        for (name, target) in &earlier.references {
            merged
                .references
                .entry(name.clone())
                .or_insert_with(|| target.clone());
        }
        for dep in &earlier.dependencies {
            if !merged.dependencies.contains(dep) {
                merged.dependencies.push(dep.clone());
            }
        }
        Ok(merged)
    }
}

/// Binds an entity type to its capabilities
#[derive(Clone)]
pub struct HandlerRegistration {
    pub entity_type: String,
    /// Folder under each root holding this type's snapshots
    pub folder: String,
    /// Lower runs first
    pub priority: i32,
    pub serializer: Arc<dyn Serializer>,
    pub post_import: Option<Arc<dyn PostImportProcessor>>,
    pub cleaner: Option<Arc<dyn CleanProcessor>>,
    pub merger: Option<Arc<dyn LayerMerger>>,
}

impl HandlerRegistration {
    /// Registration named after the serializer's type, stored in a folder of
    /// the same name, with the default clean processor.
    pub fn new(serializer: Arc<dyn Serializer>) -> Self {
        let entity_type = serializer.entity_type().to_string();
        Self {
            folder: entity_type.clone(),
            entity_type,
            priority: 0,
            serializer,
            post_import: None,
            cleaner: Some(Arc::new(DefaultCleanProcessor)),
            merger: None,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_post_import(mut self, processor: Arc<dyn PostImportProcessor>) -> Self {
        self.post_import = Some(processor);
        self
    }

    pub fn with_cleaner(mut self, cleaner: Option<Arc<dyn CleanProcessor>>) -> Self {
        self.cleaner = cleaner;
        self
    }

    pub fn with_merger(mut self, merger: Arc<dyn LayerMerger>) -> Self {
        self.merger = Some(merger);
        self
    }
}

impl std::fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("entity_type", &self.entity_type)
            .field("folder", &self.folder)
            .field("priority", &self.priority)
            .field("two_pass", &self.serializer.is_two_pass())
            .field("post_import", &self.post_import.is_some())
            .field("cleaner", &self.cleaner.is_some())
            .field("merger", &self.merger.is_some())
            .finish()
    }
}
