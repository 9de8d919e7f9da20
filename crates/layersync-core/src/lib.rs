//! layersync Core - reconciliation kernel
//!
//! This crate provides the storage-agnostic pieces of the snapshot
//! reconciliation engine:
//! - Entity records, change outcomes and actions
//! - Dependency-correct ordering (topological with level fallback)
//! - Change classification and batch validation
//! - Capability traits for per-type serializers, cleaners, mergers and
//!   post-import processors, plus the live `EntityStore` seam
//! - Per-batch context owning the clean key cache
//! - Settings loaded from `layersync.toml`

pub mod capability;
pub mod classify;
pub mod context;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod ordering;
pub mod serializer;
pub mod settings;
pub mod store;

// Re-exported so the logging macros resolve schema constants through this crate
pub use layersync_core_types as core_types;

// Re-export commonly used types
pub use capability::HandlerRegistration;
pub use context::{BatchContext, CleanKeyIndex};
pub use errors::{ExError, ExErrorKind, Result, SyncError};
pub use model::{Action, ChangeOutcome, EntityRecord, FieldChange, LiveEntity, SnapshotDocument};
pub use settings::SyncSettings;
pub use store::{EntityStore, MemoryStore};
