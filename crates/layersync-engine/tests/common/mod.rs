#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use layersync_core::capability::HandlerRegistration;
use layersync_core::model::{Action, ChangeOutcome};
use layersync_core::serializer::FieldSerializer;
use layersync_core::settings::SyncSettings;
use layersync_engine::{HandlerRegistry, SyncService};
use tempfile::TempDir;

/// Snapshot entity builder written as XML
pub struct Snap {
    pub key: String,
    pub alias: String,
    pub parent: Option<String>,
    pub level: i32,
    pub fields: Vec<(String, String)>,
    pub references: Vec<(String, String)>,
    pub dependencies: Vec<String>,
}

impl Snap {
    pub fn new(key: &str, alias: &str) -> Self {
        Self {
            key: key.to_string(),
            alias: alias.to_string(),
            parent: None,
            level: 0,
            fields: Vec::new(),
            references: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn parent(mut self, parent: &str, level: i32) -> Self {
        self.parent = Some(parent.to_string());
        self.level = level;
        self
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    pub fn reference(mut self, name: &str, target: &str) -> Self {
        self.references.push((name.to_string(), target.to_string()));
        self
    }

    pub fn depends_on(mut self, key: &str) -> Self {
        self.dependencies.push(key.to_string());
        self
    }

    pub fn to_xml(&self, entity_type: &str) -> String {
        let parent = self
            .parent
            .as_ref()
            .map(|p| format!(r#" Parent="{p}""#))
            .unwrap_or_default();
        let mut xml = format!(
            r#"<Entity Type="{}" Key="{}" Alias="{}" Level="{}" SortOrder="0"{}>"#,
            entity_type, self.key, self.alias, self.level, parent
        );
        if !self.dependencies.is_empty() {
            xml.push_str("<Dependencies>");
            for dep in &self.dependencies {
                xml.push_str(&format!(r#"<Dependency Key="{dep}" />"#));
            }
            xml.push_str("</Dependencies>");
        }
        xml.push_str("<Fields>");
        for (name, value) in &self.fields {
            xml.push_str(&format!(r#"<Field Name="{name}">{value}</Field>"#));
        }
        xml.push_str("</Fields>");
        if !self.references.is_empty() {
            xml.push_str("<References>");
            for (name, target) in &self.references {
                xml.push_str(&format!(r#"<Reference Name="{name}" Key="{target}" />"#));
            }
            xml.push_str("</References>");
        }
        xml.push_str("</Entity>");
        xml
    }
}

pub fn write_snap(root: &Path, entity_type: &str, file: &str, snap: &Snap) -> PathBuf {
    let path = root.join(entity_type).join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, snap.to_xml(entity_type)).unwrap();
    path
}

pub fn write_raw(root: &Path, relative: &str, xml: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, xml).unwrap();
    path
}

pub fn content_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register(HandlerRegistration::new(Arc::new(FieldSerializer::new("content"))))
        .unwrap();
    registry
}

pub fn content_service() -> SyncService {
    SyncService::new(content_registry(), SyncSettings::default())
}

pub fn temp_root() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("snapshots");
    fs::create_dir_all(&root).unwrap();
    (temp, root)
}

pub fn outcome_of(actions: &[Action], key: &str) -> Option<ChangeOutcome> {
    actions.iter().find(|a| a.key == key).map(|a| a.outcome)
}

pub fn keys_with(actions: &[Action], outcome: ChangeOutcome) -> Vec<String> {
    actions
        .iter()
        .filter(|a| a.outcome == outcome)
        .map(|a| a.key.clone())
        .collect()
}
