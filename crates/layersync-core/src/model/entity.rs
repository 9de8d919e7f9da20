use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::record::SnapshotDocument;

/// An entity as held by the live store
///
/// Mirrors the shape of a `SnapshotDocument` without tombstone information.
/// Real stores map their own entity model onto this through a `Serializer`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LiveEntity {
    /// Entity type name (e.g. "content", "datatype")
    pub entity_type: String,

    /// Globally unique, immutable identity
    pub key: String,

    /// Human readable name, unique only among siblings
    pub alias: String,

    pub parent_key: Option<String>,

    /// Depth in the tree (0 for roots)
    pub level: i32,

    pub sort_order: i32,

    pub trashed: bool,

    /// Keys of entities this one depends on besides its parent
    pub dependencies: Vec<String>,

    pub fields: BTreeMap<String, String>,

    /// Named links to other entities by key
    pub references: BTreeMap<String, String>,
}

impl LiveEntity {
    pub fn new(
        entity_type: impl Into<String>,
        key: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            key: key.into(),
            alias: alias.into(),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent_key: impl Into<String>) -> Self {
        self.parent_key = Some(parent_key.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_reference(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.references.insert(name.into(), target.into());
        self
    }

    /// Snapshot content for this entity
    pub fn to_document(&self) -> SnapshotDocument {
        SnapshotDocument {
            entity_type: self.entity_type.clone(),
            key: self.key.clone(),
            alias: self.alias.clone(),
            parent_key: self.parent_key.clone(),
            level: self.level,
            sort_order: self.sort_order,
            trashed: self.trashed,
            marker: None,
            dependencies: self.dependencies.clone(),
            fields: self.fields.clone(),
            references: self.references.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_document_carries_identity() {
        let entity = LiveEntity::new("content", "k2", "About")
            .with_parent("k1")
            .with_field("title", "About us");

        let doc = entity.to_document();
        assert_eq!(doc.key, "k2");
        assert_eq!(doc.parent_key.as_deref(), Some("k1"));
        assert_eq!(doc.fields.get("title").map(String::as_str), Some("About us"));
        assert!(!doc.is_tombstone());
    }
}
