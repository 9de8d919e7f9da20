#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::error::Error;
use std::path::Path;

use layersync_core::errors::{ExError, ExErrorKind, SyncError};
use layersync_core_types::BatchId;

#[test]
fn test_not_found_carries_type_and_key() {
    let err: ExError = SyncError::EntityNotFound {
        entity_type: "content".to_string(),
        key: "k1".to_string(),
    }
    .into();

    assert_eq!(err.kind(), ExErrorKind::NotFound);
    assert_eq!(err.code(), "ERR_NOT_FOUND");
    assert_eq!(err.entity_type(), Some("content"));
    assert_eq!(err.entity_key(), Some("k1"));
}

#[test]
fn test_parent_missing_distinct_from_not_found() {
    let err: ExError = SyncError::ParentNotFound {
        key: "child".to_string(),
        parent_key: "p".to_string(),
    }
    .into();

    assert_eq!(err.kind(), ExErrorKind::ParentMissing);
    assert_ne!(err.kind(), ExErrorKind::NotFound);
    assert!(err.message().contains("Parent p"));
}

#[test]
fn test_version_mismatch_keeps_root_path() {
    let err: ExError = SyncError::VersionMismatch {
        root: "/snap/site".to_string(),
        expected: 1,
        found: 2,
    }
    .into();

    assert_eq!(err.code(), "ERR_VERSION_MISMATCH");
    assert_eq!(err.path(), Some(Path::new("/snap/site")));
    assert!(err.message().contains("format version 2"));
}

#[test]
fn test_builder_context_shows_in_display() {
    let batch_id = BatchId::new();
    let err = ExError::new(ExErrorKind::Persistence)
        .with_op("save")
        .with_entity_type("content")
        .with_entity_key("k1")
        .with_batch_id(batch_id.clone())
        .with_message("disk full");

    assert_eq!(err.op(), Some("save"));
    assert_eq!(err.batch_id(), Some(&batch_id));
    let shown = err.to_string();
    assert!(shown.starts_with("[ERR_PERSISTENCE] in operation 'save': disk full"));
    assert!(shown.contains("(key: k1)"));
}

#[test]
fn test_source_chain() {
    let cause = ExError::new(ExErrorKind::Io).with_message("permission denied");
    let err = ExError::new(ExErrorKind::InvalidSnapshot)
        .with_path("/snap/content/a.config")
        .with_source(cause);

    assert_eq!(err.source_error().map(ExError::kind), Some(ExErrorKind::Io));
    assert!(err.source().is_some());
    assert!(err.to_string().contains("caused by [ERR_IO]"));
}

#[test]
fn test_every_kind_has_unique_code() {
    let kinds = [
        ExErrorKind::InvalidInput,
        ExErrorKind::NotFound,
        ExErrorKind::ParentMissing,
        ExErrorKind::DuplicateKey,
        ExErrorKind::InvalidSnapshot,
        ExErrorKind::ReferenceUnresolved,
        ExErrorKind::UnknownEntityType,
        ExErrorKind::InvalidPhaseTransition,
        ExErrorKind::VersionMismatch,
        ExErrorKind::Cancelled,
        ExErrorKind::Io,
        ExErrorKind::Serialization,
        ExErrorKind::Persistence,
        ExErrorKind::Concurrency,
        ExErrorKind::Internal,
    ];

    let mut codes: Vec<&str> = kinds.iter().map(ExErrorKind::code).collect();
    assert!(codes.iter().all(|c| c.starts_with("ERR_")));
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), kinds.len());
}
