//! Live entity store interface.
//!
//! The engine never talks to a concrete storage engine; everything it needs
//! from the live side goes through `EntityStore`.

pub mod memory;

pub use memory::MemoryStore;

use crate::errors::ExError;
use crate::model::LiveEntity;

/// Addressable store of typed entities with parent relationships
#[allow(clippy::result_large_err)]
pub trait EntityStore {
    /// Look up an entity by key.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Persistence` if the store cannot be read.
    fn get(&self, entity_type: &str, key: &str) -> Result<Option<LiveEntity>, ExError>;

    /// Look up an entity by alias among the children of `parent_key`.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Persistence` if the store cannot be read.
    fn find_by_alias(
        &self,
        entity_type: &str,
        alias: &str,
        parent_key: Option<&str>,
    ) -> Result<Option<LiveEntity>, ExError>;

    /// Direct children of `parent_key` (`None` for roots of the type).
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Persistence` if the store cannot be read.
    fn children(
        &self,
        entity_type: &str,
        parent_key: Option<&str>,
    ) -> Result<Vec<LiveEntity>, ExError>;

    /// Every entity of a type.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Persistence` if the store cannot be read.
    fn all(&self, entity_type: &str) -> Result<Vec<LiveEntity>, ExError>;

    /// Insert or replace an entity.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Persistence` if the write is rejected.
    fn save(&mut self, entity: LiveEntity) -> Result<(), ExError>;

    /// Persist several entities at once. Stores with a real bulk path
    /// override this.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by `save`.
    fn save_many(&mut self, entities: Vec<LiveEntity>) -> Result<(), ExError> {
        for entity in entities {
            self.save(entity)?;
        }
        Ok(())
    }

    /// Remove an entity. Returns `false` when it did not exist.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::Persistence` if the delete is rejected.
    fn delete(&mut self, entity_type: &str, key: &str) -> Result<bool, ExError>;

    /// # Errors
    ///
    /// Propagates errors from `get`.
    fn exists(&self, entity_type: &str, key: &str) -> Result<bool, ExError> {
        Ok(self.get(entity_type, key)?.is_some())
    }
}
