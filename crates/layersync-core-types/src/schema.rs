//! Canonical schema constants for structured logging and events
//!
//! These constants keep log fields consistent across the loader, the
//! orchestrator and the reconciler.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_BATCH_ID: &str = "batch_id";

// Entity identifiers
pub const FIELD_ENTITY_TYPE: &str = "entity_type";
pub const FIELD_ENTITY_KEY: &str = "entity_key";
pub const FIELD_ALIAS: &str = "alias";
pub const FIELD_FILE: &str = "file";

// Batch shape
pub const FIELD_PHASE: &str = "phase";
pub const FIELD_OUTCOME: &str = "outcome";
pub const FIELD_ACTION_COUNT: &str = "action_count";
pub const FIELD_RECORD_COUNT: &str = "record_count";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
pub const EVENT_PHASE: &str = "phase";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_accessibility() {
        assert!(!FIELD_COMPONENT.is_empty());
        assert!(!FIELD_OP.is_empty());
        assert!(!FIELD_BATCH_ID.is_empty());
        assert!(!EVENT_START.is_empty());
        assert!(!EVENT_END.is_empty());
        assert!(!EVENT_END_ERROR.is_empty());
    }

    #[test]
    fn test_event_names_are_distinct() {
        assert_ne!(EVENT_START, EVENT_END);
        assert_ne!(EVENT_START, EVENT_END_ERROR);
        assert_ne!(EVENT_END, EVENT_END_ERROR);
        assert_ne!(EVENT_PHASE, EVENT_END);
    }
}
