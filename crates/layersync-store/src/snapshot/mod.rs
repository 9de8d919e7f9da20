//! Snapshot files: XML codec and folder loader

pub mod codec;
pub mod loader;

pub use codec::{parse_document, read_document, render_document};
pub use loader::{load_folder, snapshot_files, LoadFailure, LoadedFolder};
