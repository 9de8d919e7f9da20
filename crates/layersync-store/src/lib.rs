//! layersync Store - snapshot folders on disk
//!
//! Provides:
//! - XML snapshot codec and recursive folder loader
//! - Layered folder merge with dedup and dependency ordering
//! - Clean key index construction
//! - File identity and clash resolution for export
//! - Atomic writes and the per-root version marker

pub mod atomic;
pub mod clean_index;
pub mod errors;
pub mod identity;
pub mod layers;
pub mod snapshot;
pub mod version;

// Re-export key types
pub use errors::Result;
pub use layers::{LayerRequest, LayeredFolderSet, MergeResult, OrderedNodeInfo, Page};
