//! layersync Engine - batch orchestration
//!
//! Coordinates the store crate (layered snapshot folders) with the core
//! kernel (ordering, classification, capabilities) to run report, import,
//! paged import, export and post-import batches against a live store.

pub mod callbacks;
pub mod clean;
pub mod commands;
pub mod export;
pub mod gate;
pub mod handlers;
pub mod import;
pub mod plan;
pub mod report;
pub mod service;

pub use callbacks::{BatchCallbacks, BatchObserver, StartDecision};
pub use handlers::{HandlerRegistry, TypeFilter};
pub use import::ImportPhase;
pub use service::{SyncOptions, SyncService};
