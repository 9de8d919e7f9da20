//! Correlation types for batch tracking
//!
//! Every top-level batch (report, import, export, post-import) carries a
//! `BatchId` so that log lines and returned actions can be tied together.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single batch operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    /// Generate a new time-ordered BatchId using UUIDv7
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of top-level batch being run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchKind {
    Report,
    Import,
    Export,
    PostImport,
}

impl BatchKind {
    /// Stable lowercase name, used as the `op` field in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Report => "report",
            BatchKind::Import => "import",
            BatchKind::Export => "export",
            BatchKind::PostImport => "post_import",
        }
    }

    /// Whether batches of this kind write to the live store
    pub fn mutates_store(&self) -> bool {
        matches!(self, BatchKind::Import | BatchKind::PostImport)
    }
}

impl std::fmt::Display for BatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
