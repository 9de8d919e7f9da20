use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Added to the level of trashed entities so they sort after everything live
pub const TRASHED_LEVEL_OFFSET: i32 = 100;

/// Tombstone variants of a snapshot file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerKind {
    /// Children of the marker's parent that have no snapshot file are removed
    Clean,
    /// The entity named by the marker's key was deleted at export time
    Delete,
    /// The entity was renamed; informational only
    Rename,
}

impl MarkerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkerKind::Clean => "Clean",
            MarkerKind::Delete => "Delete",
            MarkerKind::Rename => "Rename",
        }
    }

    /// Parse the `Change` attribute of a tombstone (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "clean" => Some(MarkerKind::Clean),
            "delete" => Some(MarkerKind::Delete),
            "rename" => Some(MarkerKind::Rename),
            _ => None,
        }
    }
}

/// Format-agnostic content of one snapshot file
///
/// `fields` are local values applied in the first pass; `references` name
/// other entities by key and are resolved in the second pass by two-pass
/// serializers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub entity_type: String,
    pub key: String,
    pub alias: String,
    pub parent_key: Option<String>,
    pub level: i32,
    pub sort_order: i32,
    pub trashed: bool,
    pub marker: Option<MarkerKind>,
    pub dependencies: Vec<String>,
    pub fields: BTreeMap<String, String>,
    pub references: BTreeMap<String, String>,
}

impl SnapshotDocument {
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

    /// Tombstone with no payload
    pub fn tombstone(
        entity_type: impl Into<String>,
        key: impl Into<String>,
        alias: impl Into<String>,
        parent_key: Option<String>,
        marker: MarkerKind,
    ) -> Self {
        Self {
            parent_key,
            marker: Some(marker),
            ..Self::new(entity_type, key, alias)
        }
    }

    /// Clean marker for the children of `parent_key` (`None` is the type root).
    ///
    /// The marker's own key is derived from the parent so that the same
    /// scope exported into two layers dedups like any other record, without
    /// colliding with the parent's own snapshot.
    pub fn clean_marker(
        entity_type: impl Into<String>,
        parent_key: Option<&str>,
        parent_alias: Option<&str>,
    ) -> Self {
        Self::tombstone(
            entity_type,
            Self::clean_marker_key(parent_key),
            parent_alias.unwrap_or("root"),
            parent_key.map(str::to_string),
            MarkerKind::Clean,
        )
    }

    pub fn clean_marker_key(parent_key: Option<&str>) -> String {
        format!("clean-{}", parent_key.unwrap_or("root"))
    }

    pub fn is_tombstone(&self) -> bool {
        self.marker.is_some()
    }

    /// Level used for ordering
    pub fn effective_level(&self) -> i32 {
        if self.trashed {
            self.level + TRASHED_LEVEL_OFFSET
        } else {
            self.level
        }
    }
}

/// Identity extracted from one snapshot file, plus its parsed content
///
/// Built fresh by the loader for each batch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub key: String,
    pub alias: String,
    pub entity_type: String,
    pub parent_key: Option<String>,
    /// Depth, with `TRASHED_LEVEL_OFFSET` applied to trashed entities
    pub level: i32,
    pub sort_hint: i32,
    pub source_file: PathBuf,
    /// Path of the source file relative to the type folder it was loaded from
    pub relative_path: PathBuf,
    pub graph_edges: Vec<String>,
    pub marker: Option<MarkerKind>,
    /// True when the document is a field-level merge of several layers and
    /// therefore does not exist verbatim on disk
    pub merged: bool,
    document: Arc<SnapshotDocument>,
}

impl EntityRecord {
    pub fn from_document(
        document: SnapshotDocument,
        source_file: impl Into<PathBuf>,
        relative_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            key: document.key.clone(),
            alias: document.alias.clone(),
            entity_type: document.entity_type.clone(),
            parent_key: document.parent_key.clone(),
            level: document.effective_level(),
            sort_hint: document.sort_order,
            source_file: source_file.into(),
            relative_path: relative_path.into(),
            graph_edges: document.dependencies.clone(),
            marker: document.marker,
            merged: false,
            document: Arc::new(document),
        }
    }

    /// Mark the record as produced by a field-level layer merge
    pub fn into_merged(mut self) -> Self {
        self.merged = true;
        self
    }

    pub fn document(&self) -> &SnapshotDocument {
        &self.document
    }

    pub fn is_clean_marker(&self) -> bool {
        self.marker == Some(MarkerKind::Clean)
    }

    pub fn is_tombstone(&self) -> bool {
        self.marker.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trashed_level_sorts_last() {
        let mut doc = SnapshotDocument::new("content", "k1", "Home");
        doc.level = 2;
        doc.trashed = true;

        let record = EntityRecord::from_document(doc, "/tmp/home.config", "home.config");
        assert_eq!(record.level, 2 + TRASHED_LEVEL_OFFSET);
    }

    #[test]
    fn test_clean_marker_identity() {
        let marker = SnapshotDocument::clean_marker("content", Some("p1"), Some("Parent"));

        assert_eq!(marker.key, "clean-p1");
        assert_eq!(marker.parent_key.as_deref(), Some("p1"));
        assert_eq!(marker.marker, Some(MarkerKind::Clean));
        assert!(marker.is_tombstone());
    }

    #[test]
    fn test_marker_parse_is_case_insensitive() {
        assert_eq!(MarkerKind::parse("DELETE"), Some(MarkerKind::Delete));
        assert_eq!(MarkerKind::parse("clean"), Some(MarkerKind::Clean));
        assert_eq!(MarkerKind::parse("archive"), None);
    }
}
