//! Core types shared across layersync facilities
//!
//! This crate provides foundational types used by the error, logging and
//! batch facilities:
//!
//! - **Correlation types**: BatchId, BatchKind
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::{BatchId, BatchKind};
