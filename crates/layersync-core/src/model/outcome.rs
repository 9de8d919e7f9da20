use serde::{Deserialize, Serialize};

/// Classification of what processing a record did, or would do, to the
/// live store.
///
/// The ordinal order is significant: everything from `ParentMissing` on is
/// a failure, and batch validation compares outcomes by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeOutcome {
    NoChange,
    Create,
    Update,
    Delete,
    Clean,
    ParentMissing,
    Fail,
}

impl ChangeOutcome {
    /// `ParentMissing` and `Fail`
    pub fn is_failure(self) -> bool {
        self >= ChangeOutcome::ParentMissing
    }

    /// `Create` and `Update`
    pub fn is_upsert(self) -> bool {
        matches!(self, ChangeOutcome::Create | ChangeOutcome::Update)
    }

    /// `Delete` and `Clean`
    pub fn is_removal(self) -> bool {
        matches!(self, ChangeOutcome::Delete | ChangeOutcome::Clean)
    }

    /// Anything that mutates (or would mutate) the live store
    pub fn is_change(self) -> bool {
        self.is_upsert() || self.is_removal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeOutcome::NoChange => "NoChange",
            ChangeOutcome::Create => "Create",
            ChangeOutcome::Update => "Update",
            ChangeOutcome::Delete => "Delete",
            ChangeOutcome::Clean => "Clean",
            ChangeOutcome::ParentMissing => "ParentMissing",
            ChangeOutcome::Fail => "Fail",
        }
    }
}

impl std::fmt::Display for ChangeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_rank_above_changes() {
        assert!(ChangeOutcome::ParentMissing > ChangeOutcome::Update);
        assert!(ChangeOutcome::Fail > ChangeOutcome::Create);
        assert!(ChangeOutcome::ParentMissing.is_failure());
        assert!(ChangeOutcome::Fail.is_failure());
        assert!(!ChangeOutcome::Clean.is_failure());
    }

    #[test]
    fn test_change_groups() {
        assert!(ChangeOutcome::Create.is_upsert());
        assert!(ChangeOutcome::Clean.is_removal());
        assert!(!ChangeOutcome::NoChange.is_change());
        assert!(ChangeOutcome::Delete.is_change());
    }
}
