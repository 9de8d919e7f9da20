//! Command orchestration layer.
//!
//! Wraps the `SyncService` batch surface in a single command enum so
//! callers can queue or dispatch batches as values.

pub mod engine_command;
