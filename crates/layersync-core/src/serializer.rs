//! Generic field/reference serializer
//!
//! Maps snapshot documents one-to-one onto `LiveEntity` values. References
//! registered with `with_reference_type` make the serializer two-pass: they
//! are only written once every first pass has created their targets.

use std::collections::{BTreeMap, BTreeSet};

use crate::capability::Serializer;
use crate::errors::{ExError, SyncError};
use crate::model::{FieldChange, LiveEntity, SnapshotDocument};
use crate::store::EntityStore;

#[derive(Debug, Clone)]
pub struct FieldSerializer {
    entity_type: String,
    /// Reference name -> entity type of its target
    reference_types: BTreeMap<String, String>,
}

impl FieldSerializer {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            reference_types: BTreeMap::new(),
        }
    }

    /// Declare a reference whose target must exist before it is written
    pub fn with_reference_type(
        mut self,
        name: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        self.reference_types.insert(name.into(), target_type.into());
        self
    }

    fn target_type<'a>(&'a self, name: &str) -> &'a str {
        self.reference_types
            .get(name)
            .map(String::as_str)
            .unwrap_or(self.entity_type.as_str())
    }
}

#[allow(clippy::result_large_err)]
impl Serializer for FieldSerializer {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn is_two_pass(&self) -> bool {
        !self.reference_types.is_empty()
    }

    fn serialize(&self, entity: &LiveEntity) -> Result<SnapshotDocument, ExError> {
        Ok(entity.to_document())
    }

    fn deserialize(
        &self,
        document: &SnapshotDocument,
        existing: Option<&LiveEntity>,
        _store: &dyn EntityStore,
    ) -> Result<LiveEntity, ExError> {
        let references = if self.is_two_pass() {
            // Keep what is live until the second pass can verify targets
            existing.map(|e| e.references.clone()).unwrap_or_default()
        } else {
            document.references.clone()
        };

        Ok(LiveEntity {
            entity_type: self.entity_type.clone(),
            key: document.key.clone(),
            alias: document.alias.clone(),
            parent_key: document.parent_key.clone(),
            level: document.level,
            sort_order: document.sort_order,
            trashed: document.trashed,
            dependencies: document.dependencies.clone(),
            fields: document.fields.clone(),
            references,
        })
    }

    fn deserialize_second_pass(
        &self,
        document: &SnapshotDocument,
        mut entity: LiveEntity,
        store: &dyn EntityStore,
    ) -> Result<LiveEntity, ExError> {
        for (name, target) in &document.references {
            if !store.exists(self.target_type(name), target)? {
                return Err(SyncError::ReferenceUnresolved {
                    key: document.key.clone(),
                    name: name.clone(),
                    target: target.clone(),
                }
                .into());
            }
        }
        entity.references = document.references.clone();
        Ok(entity)
    }

    fn compare(&self, document: &SnapshotDocument, live: &LiveEntity) -> Vec<FieldChange> {
        let mut changes = Vec::new();

        if document.alias != live.alias {
            changes.push(FieldChange::new(
                "alias",
                Some(live.alias.clone()),
                Some(document.alias.clone()),
            ));
        }
        if document.parent_key != live.parent_key {
            changes.push(FieldChange::new(
                "parent",
                live.parent_key.clone(),
                document.parent_key.clone(),
            ));
        }
        if document.sort_order != live.sort_order {
            changes.push(FieldChange::new(
                "sortOrder",
                Some(live.sort_order.to_string()),
                Some(document.sort_order.to_string()),
            ));
        }
        if document.trashed != live.trashed {
            changes.push(FieldChange::new(
                "trashed",
                Some(live.trashed.to_string()),
                Some(document.trashed.to_string()),
            ));
        }

        diff_maps("fields", &live.fields, &document.fields, &mut changes);
        diff_maps(
            "references",
            &live.references,
            &document.references,
            &mut changes,
        );

        let live_deps: BTreeSet<&String> = live.dependencies.iter().collect();
        let doc_deps: BTreeSet<&String> = document.dependencies.iter().collect();
        if live_deps != doc_deps {
            changes.push(FieldChange::new(
                "dependencies",
                Some(join(&live_deps)),
                Some(join(&doc_deps)),
            ));
        }

        changes
    }
}

fn diff_maps(
    prefix: &str,
    live: &BTreeMap<String, String>,
    document: &BTreeMap<String, String>,
    changes: &mut Vec<FieldChange>,
) {
    let names: BTreeSet<&String> = live.keys().chain(document.keys()).collect();
    for name in names {
        let old = live.get(name);
        let new = document.get(name);
        if old != new {
            changes.push(FieldChange::new(
                format!("{prefix}.{name}"),
                old.cloned(),
                new.cloned(),
            ));
        }
    }
}

fn join(values: &BTreeSet<&String>) -> String {
    values
        .iter()
        .map(|v| v.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExErrorKind;
    use crate::store::MemoryStore;

    fn document() -> SnapshotDocument {
        let mut doc = SnapshotDocument::new("content", "k1", "Home");
        doc.fields.insert("title".into(), "Welcome".into());
        doc.references.insert("template".into(), "t1".into());
        doc
    }

    #[test]
    fn test_roundtrip_has_no_changes() {
        let serializer = FieldSerializer::new("content");
        let store = MemoryStore::new();

        let entity = serializer.deserialize(&document(), None, &store).unwrap();
        assert!(serializer.compare(&document(), &entity).is_empty());
    }

    #[test]
    fn test_compare_reports_field_changes() {
        let serializer = FieldSerializer::new("content");
        let live = LiveEntity::new("content", "k1", "Home")
            .with_field("title", "Old")
            .with_field("legacy", "x")
            .with_reference("template", "t1");

        let changes = serializer.compare(&document(), &live);
        let names: Vec<&str> = changes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["fields.legacy", "fields.title"]);
        assert_eq!(changes[1].old_value.as_deref(), Some("Old"));
        assert_eq!(changes[1].new_value.as_deref(), Some("Welcome"));
    }

    #[test]
    fn test_two_pass_defers_references() {
        let serializer = FieldSerializer::new("content").with_reference_type("template", "template");
        let mut store = MemoryStore::new();
        assert!(serializer.is_two_pass());

        let first = serializer.deserialize(&document(), None, &store).unwrap();
        assert!(first.references.is_empty());

        let err = serializer
            .deserialize_second_pass(&document(), first.clone(), &store)
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::ReferenceUnresolved);

        store.insert(LiveEntity::new("template", "t1", "Page"));
        let second = serializer
            .deserialize_second_pass(&document(), first, &store)
            .unwrap();
        assert_eq!(
            second.references.get("template").map(String::as_str),
            Some("t1")
        );
    }
}
