//! Handler registry
//!
//! Holds one `HandlerRegistration` per entity type and resolves, for a
//! batch, which handlers run, in which order, with which settings.

#![allow(clippy::result_large_err)]

use std::collections::BTreeSet;

use layersync_core::capability::HandlerRegistration;
use layersync_core::errors::{ExError, ExErrorKind, SyncError};
use layersync_core::settings::{EffectiveHandlerSettings, SyncSettings};

/// Which entity types a batch touches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TypeFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl TypeFilter {
    pub fn only<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TypeFilter::Only(types.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, entity_type: &str) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Only(types) => types.contains(entity_type),
        }
    }
}

/// A registration with the settings that apply to it for one batch
#[derive(Debug, Clone)]
pub struct ResolvedHandler<'a> {
    pub registration: &'a HandlerRegistration,
    pub settings: EffectiveHandlerSettings,
    /// Type folder under each root
    pub folder: String,
}

impl ResolvedHandler<'_> {
    pub fn entity_type(&self) -> &str {
        &self.registration.entity_type
    }
}

#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<HandlerRegistration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Handlers run by ascending priority, then type name.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::InvalidInput` if the type is already registered.
    pub fn register(&mut self, registration: HandlerRegistration) -> Result<(), ExError> {
        if self.get(&registration.entity_type).is_some() {
            return Err(ExError::new(ExErrorKind::InvalidInput)
                .with_op("register_handler")
                .with_entity_type(registration.entity_type.clone())
                .with_message("entity type already registered"));
        }
        self.handlers.push(registration);
        self.handlers.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.entity_type.cmp(&b.entity_type))
        });
        Ok(())
    }

    pub fn get(&self, entity_type: &str) -> Option<&HandlerRegistration> {
        self.handlers.iter().find(|h| h.entity_type == entity_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandlerRegistration> {
        self.handlers.iter()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Enabled handlers selected by `filter`, in run order.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::UnknownEntityType` if the filter names a type
    /// with no registration.
    pub fn resolve(
        &self,
        settings: &SyncSettings,
        filter: &TypeFilter,
    ) -> Result<Vec<ResolvedHandler<'_>>, ExError> {
        if let TypeFilter::Only(types) = filter {
            if let Some(unknown) = types.iter().find(|t| self.get(t).is_none()) {
                return Err(SyncError::UnknownEntityType {
                    entity_type: unknown.clone(),
                }
                .into());
            }
        }

        Ok(self
            .handlers
            .iter()
            .filter(|h| filter.matches(&h.entity_type))
            .filter_map(|registration| {
                let effective = settings.for_handler(&registration.entity_type);
                if !effective.enabled {
                    tracing::debug!(
                        entity_type = registration.entity_type.as_str(),
                        "handler disabled by settings"
                    );
                    return None;
                }
                let folder = effective
                    .folder
                    .clone()
                    .unwrap_or_else(|| registration.folder.clone());
                Some(ResolvedHandler {
                    registration,
                    settings: effective,
                    folder,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layersync_core::serializer::FieldSerializer;
    use std::sync::Arc;

    fn registration(entity_type: &str, priority: i32) -> HandlerRegistration {
        HandlerRegistration::new(Arc::new(FieldSerializer::new(entity_type))).with_priority(priority)
    }

    #[test]
    fn test_run_order_by_priority_then_name() {
        let mut registry = HandlerRegistry::new();
        registry.register(registration("content", 20)).unwrap();
        registry.register(registration("template", 10)).unwrap();
        registry.register(registration("datatype", 10)).unwrap();

        let order: Vec<&str> = registry.iter().map(|h| h.entity_type.as_str()).collect();
        assert_eq!(order, vec!["datatype", "template", "content"]);
    }

    #[test]
    fn test_registered_folder_unless_settings_override() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(registration("content", 0).with_folder("site-content"))
            .unwrap();

        let defaults = registry.resolve(&SyncSettings::default(), &TypeFilter::All).unwrap();
        assert_eq!(defaults[0].folder, "site-content");

        let settings = SyncSettings::parse("[handlers.content]\nfolder = \"pages\"\n").unwrap();
        let overridden = registry.resolve(&settings, &TypeFilter::All).unwrap();
        assert_eq!(overridden[0].folder, "pages");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register(registration("content", 0)).unwrap();

        let err = registry.register(registration("content", 5)).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    }

    #[test]
    fn test_resolve_applies_filter_and_settings() {
        let mut registry = HandlerRegistry::new();
        registry.register(registration("content", 0)).unwrap();
        registry.register(registration("media", 0)).unwrap();
        registry.register(registration("template", 0)).unwrap();

        let settings = SyncSettings::parse(
            "[handlers.media]\nenabled = false\n[handlers.content]\nfolder = \"pages\"\n",
        )
        .unwrap();

        let all = registry.resolve(&settings, &TypeFilter::All).unwrap();
        let types: Vec<&str> = all.iter().map(|h| h.entity_type()).collect();
        assert_eq!(types, vec!["content", "template"]);
        assert_eq!(all[0].folder, "pages");

        let only = registry
            .resolve(&settings, &TypeFilter::only(["template"]))
            .unwrap();
        assert_eq!(only.len(), 1);

        let err = registry
            .resolve(&settings, &TypeFilter::only(["nope"]))
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::UnknownEntityType);
    }
}
