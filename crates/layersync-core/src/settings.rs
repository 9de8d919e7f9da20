//! Settings loaded from `layersync.toml`
//!
//! Every field has a default, so a missing file or a partial file is valid.
//! Per-handler tables override the global values for one entity type:
//!
//! ```toml
//! extension = "config"
//! flat_layout = true
//!
//! [handlers.content]
//! flat_layout = false
//! create_only = true
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::errors::{ExError, ExErrorKind, SyncError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Snapshot file extension, without the dot
    pub extension: String,

    /// All snapshots of a type in one folder, instead of one folder per parent
    pub flat_layout: bool,

    /// Name files after the entity key instead of the alias
    pub use_stable_id_as_name: bool,

    /// Persist first pass mutations with one bulk save
    pub batch_save: bool,

    /// Reconcile each type folder against the live store after import
    pub clean_on_import: bool,

    /// Remove existing type folders before export
    pub clean_export_folder: bool,

    pub handlers: BTreeMap<String, HandlerSettings>,
}

impl SyncSettings {
    pub const FILE_NAME: &'static str = "layersync.toml";

    /// Load settings, falling back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Io` if the file exists but cannot be read, or
    /// `ExErrorKind::Serialization` if it is not valid TOML for these settings.
    #[allow(clippy::result_large_err)]
    pub fn load(path: &Path) -> Result<Self, ExError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "settings file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ExError::new(ExErrorKind::Io)
                .with_op("load_settings")
                .with_path(path)
                .with_message(e.to_string())
        })?;

        Self::parse(&content).map_err(|e| e.with_path(path))
    }

    /// # Errors
    ///
    /// Returns `ExErrorKind::Serialization` if `content` is not valid.
    #[allow(clippy::result_large_err)]
    pub fn parse(content: &str) -> Result<Self, ExError> {
        toml::from_str(content).map_err(|e| {
            ExError::from(SyncError::Serialization {
                message: format!("Failed to parse settings: {}", e),
            })
            .with_op("load_settings")
        })
    }

    /// # Errors
    ///
    /// Returns `ExErrorKind::Serialization` if the settings cannot be encoded.
    #[allow(clippy::result_large_err)]
    pub fn to_toml(&self) -> Result<String, ExError> {
        toml::to_string_pretty(self).map_err(|e| {
            SyncError::Serialization {
                message: format!("Failed to serialize settings: {}", e),
            }
            .into()
        })
    }

    /// Settings for one entity type, with per-handler overrides applied
    pub fn for_handler(&self, entity_type: &str) -> EffectiveHandlerSettings {
        let overrides = self.handlers.get(entity_type);
        let pick = |value: Option<bool>, global: bool| value.unwrap_or(global);

        EffectiveHandlerSettings {
            enabled: overrides.map_or(true, |h| h.enabled),
            flat_layout: pick(overrides.and_then(|h| h.flat_layout), self.flat_layout),
            use_stable_id_as_name: pick(
                overrides.and_then(|h| h.use_stable_id_as_name),
                self.use_stable_id_as_name,
            ),
            create_only: overrides.is_some_and(|h| h.create_only),
            batch_save: pick(overrides.and_then(|h| h.batch_save), self.batch_save),
            folder: overrides.and_then(|h| h.folder.clone()),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            extension: "config".to_string(),
            flat_layout: true,
            use_stable_id_as_name: false,
            batch_save: false,
            clean_on_import: false,
            clean_export_folder: false,
            handlers: BTreeMap::new(),
        }
    }
}

/// Overrides for one handler; unset values inherit the global setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerSettings {
    pub enabled: bool,
    pub flat_layout: Option<bool>,
    pub use_stable_id_as_name: Option<bool>,
    /// Never update entities that already exist
    pub create_only: bool,
    pub batch_save: Option<bool>,
    /// Folder name under each root, when it differs from the registration
    pub folder: Option<String>,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            flat_layout: None,
            use_stable_id_as_name: None,
            create_only: false,
            batch_save: None,
            folder: None,
        }
    }
}

/// Resolved settings for one handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveHandlerSettings {
    pub enabled: bool,
    pub flat_layout: bool,
    pub use_stable_id_as_name: bool,
    pub create_only: bool,
    pub batch_save: bool,
    pub folder: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SyncSettings::default();
        assert_eq!(settings.extension, "config");
        assert!(settings.flat_layout);
        assert!(!settings.batch_save);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = SyncSettings::parse("batch_save = true\n").unwrap();
        assert!(settings.batch_save);
        assert_eq!(settings.extension, "config");
    }

    #[test]
    fn test_handler_overrides() {
        let settings = SyncSettings::parse(
            r#"
flat_layout = true

[handlers.content]
flat_layout = false
create_only = true
folder = "pages"

[handlers.media]
enabled = false
"#,
        )
        .unwrap();

        let content = settings.for_handler("content");
        assert!(!content.flat_layout);
        assert!(content.create_only);
        assert_eq!(content.folder.as_deref(), Some("pages"));

        assert!(!settings.for_handler("media").enabled);

        let other = settings.for_handler("datatype");
        assert!(other.enabled);
        assert!(other.flat_layout);
        assert!(!other.create_only);
    }

    #[test]
    fn test_invalid_toml_is_serialization_error() {
        let err = SyncSettings::parse("flat_layout = \"yes\"").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Serialization);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let settings = SyncSettings::load(Path::new("/nonexistent/layersync.toml")).unwrap();
        assert_eq!(settings, SyncSettings::default());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut settings = SyncSettings::default();
        settings
            .handlers
            .insert("content".to_string(), HandlerSettings::default());

        let text = settings.to_toml().unwrap();
        assert_eq!(SyncSettings::parse(&text).unwrap(), settings);
    }
}
