use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::outcome::ChangeOutcome;

/// One differing property between a snapshot and the live entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl FieldChange {
    pub fn new(
        name: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            old_value,
            new_value,
        }
    }
}

/// Per-item result of a report, import or export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub outcome: ChangeOutcome,
    /// Human name, usually the alias
    pub name: String,
    pub entity_type: String,
    pub key: String,
    pub file_path: Option<PathBuf>,
    pub message: Option<String>,
    pub changes: Vec<FieldChange>,
}

impl Action {
    pub fn new(
        outcome: ChangeOutcome,
        entity_type: impl Into<String>,
        key: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            outcome,
            name: name.into(),
            entity_type: entity_type.into(),
            key: key.into(),
            file_path: None,
            message: None,
            changes: Vec::new(),
        }
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_changes(mut self, changes: Vec<FieldChange>) -> Self {
        self.changes = changes;
        self
    }

    /// Replace the outcome with `Fail`, keeping identity and file
    pub fn into_failure(mut self, message: impl Into<String>) -> Self {
        self.outcome = ChangeOutcome::Fail;
        self.message = Some(message.into());
        self
    }

    /// Downgrade to `NoChange`, e.g. a clean marker that removed nothing
    pub fn into_no_change(mut self, message: impl Into<String>) -> Self {
        self.outcome = ChangeOutcome::NoChange;
        self.message = Some(message.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_failure()
    }
}

/// Counts of actions per outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSummary {
    counts: BTreeMap<ChangeOutcome, usize>,
    total: usize,
}

impl ActionSummary {
    pub fn from_actions(actions: &[Action]) -> Self {
        let mut summary = Self::default();
        for action in actions {
            *summary.counts.entry(action.outcome).or_insert(0) += 1;
            summary.total += 1;
        }
        summary
    }

    pub fn count(&self, outcome: ChangeOutcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of actions that changed (or would change) the live store
    pub fn changes(&self) -> usize {
        self.counts
            .iter()
            .filter(|(outcome, _)| outcome.is_change())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.counts
            .iter()
            .filter(|(outcome, _)| outcome.is_failure())
            .map(|(_, n)| n)
            .sum()
    }
}

impl std::fmt::Display for ActionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} items", self.total)?;
        for (outcome, count) in &self.counts {
            write!(f, ", {} {}", count, outcome)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let actions = vec![
            Action::new(ChangeOutcome::Create, "content", "a", "A"),
            Action::new(ChangeOutcome::Create, "content", "b", "B"),
            Action::new(ChangeOutcome::NoChange, "content", "c", "C"),
            Action::new(ChangeOutcome::Fail, "content", "d", "D"),
        ];

        let summary = ActionSummary::from_actions(&actions);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.count(ChangeOutcome::Create), 2);
        assert_eq!(summary.changes(), 2);
        assert_eq!(summary.failures(), 1);
        assert_eq!(summary.to_string(), "4 items, 1 NoChange, 2 Create, 1 Fail");
    }

    #[test]
    fn test_action_serializes() {
        let action = Action::new(ChangeOutcome::Update, "content", "k1", "Home")
            .with_file("content/home.config")
            .with_changes(vec![FieldChange::new(
                "title",
                Some("Old".to_string()),
                Some("New".to_string()),
            )]);

        let json = serde_json::to_string(&action).unwrap();
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_into_failure_keeps_identity() {
        let action = Action::new(ChangeOutcome::Update, "content", "k1", "Home")
            .into_failure("second pass: missing target");

        assert_eq!(action.outcome, ChangeOutcome::Fail);
        assert_eq!(action.key, "k1");
        assert_eq!(action.message.as_deref(), Some("second pass: missing target"));
    }
}
