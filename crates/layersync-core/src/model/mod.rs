pub mod action;
pub mod entity;
pub mod outcome;
pub mod record;

pub use action::{Action, ActionSummary, FieldChange};
pub use entity::LiveEntity;
pub use outcome::ChangeOutcome;
pub use record::{EntityRecord, MarkerKind, SnapshotDocument, TRASHED_LEVEL_OFFSET};
