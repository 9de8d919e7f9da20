use std::collections::{HashMap, HashSet};

use super::EntityStore;
use crate::errors::{ExError, ExErrorKind};
use crate::model::LiveEntity;

/// In-memory store keyed by entity type then key
///
/// Not thread-safe; designed for single-threaded batches and tests. Counts
/// individual and bulk saves so callers can observe batch-save behaviour.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entities: HashMap<String, HashMap<String, LiveEntity>>,
    rejected_keys: HashSet<String>,
    save_calls: usize,
    bulk_save_calls: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entity without counting it as a save
    pub fn insert(&mut self, entity: LiveEntity) {
        self.entities
            .entry(entity.entity_type.clone())
            .or_default()
            .insert(entity.key.clone(), entity);
    }

    /// Make every later save of `key` fail with `ExErrorKind::Persistence`
    pub fn reject_saves_for(&mut self, key: impl Into<String>) {
        self.rejected_keys.insert(key.into());
    }

    /// Number of entities of a type
    pub fn len(&self, entity_type: &str) -> usize {
        self.entities.get(entity_type).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.values().all(HashMap::is_empty)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls
    }

    pub fn bulk_save_calls(&self) -> usize {
        self.bulk_save_calls
    }

    #[allow(clippy::result_large_err)]
    fn store_entity(&mut self, entity: LiveEntity) -> Result<(), ExError> {
        if self.rejected_keys.contains(&entity.key) {
            return Err(ExError::new(ExErrorKind::Persistence)
                .with_op("save")
                .with_entity_type(entity.entity_type.clone())
                .with_entity_key(entity.key.clone())
                .with_message("save rejected"));
        }
        self.insert(entity);
        Ok(())
    }
}

impl EntityStore for MemoryStore {
    fn get(&self, entity_type: &str, key: &str) -> Result<Option<LiveEntity>, ExError> {
        Ok(self
            .entities
            .get(entity_type)
            .and_then(|by_key| by_key.get(key))
            .cloned())
    }

    fn find_by_alias(
        &self,
        entity_type: &str,
        alias: &str,
        parent_key: Option<&str>,
    ) -> Result<Option<LiveEntity>, ExError> {
        let Some(by_key) = self.entities.get(entity_type) else {
            return Ok(None);
        };
        // Several matches would be ambiguous; pick the smallest key
        Ok(by_key
            .values()
            .filter(|e| e.alias == alias && e.parent_key.as_deref() == parent_key)
            .min_by(|a, b| a.key.cmp(&b.key))
            .cloned())
    }

    fn children(
        &self,
        entity_type: &str,
        parent_key: Option<&str>,
    ) -> Result<Vec<LiveEntity>, ExError> {
        let mut children: Vec<LiveEntity> = self
            .entities
            .get(entity_type)
            .map(|by_key| {
                by_key
                    .values()
                    .filter(|e| e.parent_key.as_deref() == parent_key)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        children.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(children)
    }

    fn all(&self, entity_type: &str) -> Result<Vec<LiveEntity>, ExError> {
        let mut all: Vec<LiveEntity> = self
            .entities
            .get(entity_type)
            .map(|by_key| by_key.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(all)
    }

    fn save(&mut self, entity: LiveEntity) -> Result<(), ExError> {
        self.save_calls += 1;
        self.store_entity(entity)
    }

    fn save_many(&mut self, entities: Vec<LiveEntity>) -> Result<(), ExError> {
        self.bulk_save_calls += 1;
        for entity in entities {
            self.store_entity(entity)?;
        }
        Ok(())
    }

    fn delete(&mut self, entity_type: &str, key: &str) -> Result<bool, ExError> {
        Ok(self
            .entities
            .get_mut(entity_type)
            .and_then(|by_key| by_key.remove(key))
            .is_some())
    }
}
