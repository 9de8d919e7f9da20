use layersync_core_types::BatchId;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that callers can match on without
/// parsing messages. Per-item failures inside a batch are reported through
/// `Action`s; these kinds describe failures of a whole operation or of a
/// single capability call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Structural/Validation
    InvalidInput,
    NotFound,
    ParentMissing,
    DuplicateKey,
    InvalidSnapshot,
    ReferenceUnresolved,
    UnknownEntityType,

    // Batch lifecycle
    InvalidPhaseTransition,
    VersionMismatch,
    Cancelled,

    // Integration/IO
    Io,
    Serialization,
    Persistence,
    Concurrency,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::ParentMissing => "ERR_PARENT_MISSING",
            ExErrorKind::DuplicateKey => "ERR_DUPLICATE_KEY",
            ExErrorKind::InvalidSnapshot => "ERR_INVALID_SNAPSHOT",
            ExErrorKind::ReferenceUnresolved => "ERR_REFERENCE_UNRESOLVED",
            ExErrorKind::UnknownEntityType => "ERR_UNKNOWN_ENTITY_TYPE",
            ExErrorKind::InvalidPhaseTransition => "ERR_INVALID_PHASE_TRANSITION",
            ExErrorKind::VersionMismatch => "ERR_VERSION_MISMATCH",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries a classification kind for programmatic handling plus the
/// entity/file context needed to explain the failure in an `Action`.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_type: Option<String>,
    entity_key: Option<String>,
    path: Option<PathBuf>,
    batch_id: Option<BatchId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_type: None,
            entity_key: None,
            path: None,
            batch_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity type context
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Add entity key context
    pub fn with_entity_key(mut self, key: impl Into<String>) -> Self {
        self.entity_key = Some(key.into());
        self
    }

    /// Add file or folder context
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Add batch correlation
    pub fn with_batch_id(mut self, batch_id: BatchId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity type context, if any
    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    /// Get the entity key context, if any
    pub fn entity_key(&self) -> Option<&str> {
        self.entity_key.as_deref()
    }

    /// Get the file or folder context, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get the batch correlation, if any
    pub fn batch_id(&self) -> Option<&BatchId> {
        self.batch_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_type) = &self.entity_type {
            write!(f, " (entity_type: {})", entity_type)?;
        }
        if let Some(key) = &self.entity_key {
            write!(f, " (key: {})", key)?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(source) = &self.source {
            write!(f, " caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain error taxonomy for reconciliation operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Entity not present in the live store
    #[error("{entity_type} entity not found: {key}")]
    EntityNotFound { entity_type: String, key: String },

    /// Declared parent could not be resolved
    #[error("Parent {parent_key} of {key} not found")]
    ParentNotFound { key: String, parent_key: String },

    /// The same key was found in more than one file of a single folder
    #[error("Key {key} found in more than one file: {files:?}")]
    DuplicateKey { key: String, files: Vec<String> },

    /// Snapshot file could not be parsed or is missing identity attributes
    #[error("Invalid snapshot {path}: {reason}")]
    InvalidSnapshot { path: String, reason: String },

    /// A forward reference still points at a missing entity
    #[error("Reference '{name}' of {key} points at missing entity {target}")]
    ReferenceUnresolved {
        key: String,
        name: String,
        target: String,
    },

    /// No handler is registered for the entity type
    #[error("No handler registered for entity type: {entity_type}")]
    UnknownEntityType { entity_type: String },

    /// Import state machine was driven out of order
    #[error("Invalid import phase transition: {from} -> {to}")]
    InvalidPhaseTransition { from: String, to: String },

    /// Snapshot root was written by an incompatible format version
    #[error("Snapshot root {root} has format version {found}, expected {expected}")]
    VersionMismatch {
        root: String,
        expected: u32,
        found: u32,
    },

    /// Batch was cancelled by an observer before it started
    #[error("Batch cancelled: {reason}")]
    Cancelled { reason: String },

    /// Settings or payload could not be (de)serialized
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Internal invariant broken
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<SyncError> for ExError {
    fn from(err: SyncError) -> Self {
        let message = err.to_string();
        match err {
            SyncError::EntityNotFound { entity_type, key } => ExError::new(ExErrorKind::NotFound)
                .with_entity_type(entity_type)
                .with_entity_key(key),
            SyncError::ParentNotFound { key, .. } => {
                ExError::new(ExErrorKind::ParentMissing).with_entity_key(key)
            }
            SyncError::DuplicateKey { key, .. } => {
                ExError::new(ExErrorKind::DuplicateKey).with_entity_key(key)
            }
            SyncError::InvalidSnapshot { path, .. } => {
                ExError::new(ExErrorKind::InvalidSnapshot).with_path(path)
            }
            SyncError::ReferenceUnresolved { key, .. } => {
                ExError::new(ExErrorKind::ReferenceUnresolved).with_entity_key(key)
            }
            SyncError::UnknownEntityType { entity_type } => {
                ExError::new(ExErrorKind::UnknownEntityType).with_entity_type(entity_type)
            }
            SyncError::InvalidPhaseTransition { .. } => {
                ExError::new(ExErrorKind::InvalidPhaseTransition)
            }
            SyncError::VersionMismatch { root, .. } => {
                ExError::new(ExErrorKind::VersionMismatch).with_path(root)
            }
            SyncError::Cancelled { .. } => ExError::new(ExErrorKind::Cancelled),
            SyncError::Serialization { .. } => ExError::new(ExErrorKind::Serialization),
            SyncError::Internal { .. } => ExError::new(ExErrorKind::Internal),
        }
        .with_message(message)
    }
}
