//! Change classification and batch validation
//!
//! `classify` decides what a single record would do to the live store.
//! The batch-level passes then adjust outcomes that depend on other records:
//! `resolve_missing_parents` upgrades records whose parent is created in the
//! same batch, and `separate_clashes` turns contradictory outcomes for one
//! key into a single failure.

use std::collections::{BTreeMap, HashSet};

use crate::capability::Serializer;
use crate::errors::ExError;
use crate::model::{Action, ChangeOutcome, EntityRecord, FieldChange, LiveEntity, MarkerKind};
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyOptions {
    /// Report unchanged entities as `Update` so they are imported anyway
    pub force: bool,
    /// Never update entities that already exist
    pub create_only: bool,
    /// Whether the handler has a clean processor
    pub can_clean: bool,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            force: false,
            create_only: false,
            can_clean: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub outcome: ChangeOutcome,
    /// The outcome before parent validation; what a `ParentMissing` record
    /// becomes once its parent is known to exist
    pub underlying: ChangeOutcome,
    pub changes: Vec<FieldChange>,
    /// Live entity matched by key or by alias and parent
    pub existing: Option<LiveEntity>,
    pub message: Option<String>,
}

impl Classification {
    fn new(outcome: ChangeOutcome) -> Self {
        Self {
            outcome,
            underlying: outcome,
            changes: Vec::new(),
            existing: None,
            message: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A record paired with its classification
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedItem {
    pub record: EntityRecord,
    pub classification: Classification,
}

impl ClassifiedItem {
    pub fn outcome(&self) -> ChangeOutcome {
        self.classification.outcome
    }

    pub fn to_action(&self) -> Action {
        let mut action = Action::new(
            self.classification.outcome,
            self.record.entity_type.clone(),
            self.record.key.clone(),
            self.record.alias.clone(),
        )
        .with_file(&self.record.source_file)
        .with_changes(self.classification.changes.clone());
        action.message = self.classification.message.clone();
        action
    }
}

/// Classify one record against the live store.
///
/// # Errors
///
/// Propagates store read failures. Per-record problems are expressed as
/// outcomes, not errors.
#[allow(clippy::result_large_err)]
pub fn classify(
    record: &EntityRecord,
    store: &dyn EntityStore,
    serializer: &dyn Serializer,
    options: ClassifyOptions,
) -> Result<Classification, ExError> {
    match record.marker {
        Some(MarkerKind::Clean) if options.can_clean => {
            return Ok(Classification::new(ChangeOutcome::Clean))
        }
        Some(MarkerKind::Clean) => {
            return Ok(Classification::new(ChangeOutcome::NoChange)
                .with_message("type does not support clean"))
        }
        Some(MarkerKind::Delete) => {
            return Ok(match store.get(&record.entity_type, &record.key)? {
                Some(live) => Classification {
                    existing: Some(live),
                    ..Classification::new(ChangeOutcome::Delete)
                },
                None => Classification::new(ChangeOutcome::NoChange)
                    .with_message("already deleted"),
            });
        }
        Some(MarkerKind::Rename) => {
            return Ok(Classification::new(ChangeOutcome::NoChange).with_message("renamed"))
        }
        None => {}
    }

    let existing = match store.get(&record.entity_type, &record.key)? {
        Some(live) => Some(live),
        None => store.find_by_alias(
            &record.entity_type,
            &record.alias,
            record.parent_key.as_deref(),
        )?,
    };

    let mut classification = match existing {
        None => Classification::new(ChangeOutcome::Create),
        Some(live) => {
            let changes = serializer.compare(record.document(), &live);
            let mut result = if options.create_only {
                Classification::new(ChangeOutcome::NoChange).with_message("create only")
            } else if !changes.is_empty() {
                Classification::new(ChangeOutcome::Update)
            } else if options.force {
                Classification::new(ChangeOutcome::Update).with_message("forced")
            } else {
                Classification::new(ChangeOutcome::NoChange)
            };
            result.changes = changes;
            result.existing = Some(live);
            result
        }
    };

    if classification.outcome.is_upsert() {
        if let Some(parent) = record.parent_key.as_deref() {
            if !store.exists(&record.entity_type, parent)? {
                classification.outcome = ChangeOutcome::ParentMissing;
                classification.message = Some(format!("parent {} not found", parent));
            }
        }
    }

    Ok(classification)
}

/// Upgrade `ParentMissing` records whose parent is created or kept by the
/// same batch. Runs to a fixpoint so whole missing subtrees resolve.
///
/// Returns the number of records upgraded.
pub fn resolve_missing_parents(items: &mut [ClassifiedItem]) -> usize {
    let mut resolvable: HashSet<String> = items
        .iter()
        .filter(|i| !i.outcome().is_failure() && !i.outcome().is_removal())
        .map(|i| i.record.key.clone())
        .collect();

    let mut upgraded = 0;
    loop {
        let mut progressed = false;
        for item in items.iter_mut() {
            if item.outcome() != ChangeOutcome::ParentMissing {
                continue;
            }
            let parent_in_batch = item
                .record
                .parent_key
                .as_deref()
                .is_some_and(|p| resolvable.contains(p));
            if parent_in_batch {
                item.classification.outcome = item.classification.underlying;
                item.classification.message = None;
                resolvable.insert(item.record.key.clone());
                upgraded += 1;
                progressed = true;
            }
        }
        if !progressed {
            return upgraded;
        }
    }
}

/// Split out keys that are both removed and created/updated in one batch.
///
/// Every record involved in a clash is dropped from the returned items and
/// replaced by one `Fail` action per key. Order of the kept items is
/// preserved.
pub fn separate_clashes(items: Vec<ClassifiedItem>) -> (Vec<ClassifiedItem>, Vec<Action>) {
    let mut by_key: BTreeMap<&str, (bool, bool)> = BTreeMap::new();
    for item in &items {
        let entry = by_key.entry(item.record.key.as_str()).or_default();
        entry.0 |= item.outcome().is_removal();
        entry.1 |= item.outcome().is_upsert();
    }
    let clashing: HashSet<String> = by_key
        .into_iter()
        .filter(|(_, (removed, upserted))| *removed && *upserted)
        .map(|(key, _)| key.to_string())
        .collect();

    if clashing.is_empty() {
        return (items, Vec::new());
    }

    let mut kept = Vec::with_capacity(items.len());
    let mut involved: BTreeMap<String, Vec<ClassifiedItem>> = BTreeMap::new();
    for item in items {
        let in_clash = clashing.contains(&item.record.key)
            && (item.outcome().is_removal() || item.outcome().is_upsert());
        if in_clash {
            involved
                .entry(item.record.key.clone())
                .or_default()
                .push(item);
        } else {
            kept.push(item);
        }
    }

    let failures = involved
        .into_iter()
        .map(|(key, group)| clash_action(&key, &group))
        .collect();

    (kept, failures)
}

fn clash_action(key: &str, group: &[ClassifiedItem]) -> Action {
    let describe = |pred: fn(ChangeOutcome) -> bool| -> String {
        group
            .iter()
            .filter(|i| pred(i.outcome()))
            .map(|i| format!("{} ({})", i.record.source_file.display(), i.outcome()))
            .collect::<Vec<_>>()
            .join(", ")
    };

    // Report against the create/update record when there is one
    let primary = group
        .iter()
        .find(|i| i.outcome().is_upsert())
        .or_else(|| group.first());

    let (entity_type, name, file) = match primary {
        Some(i) => (
            i.record.entity_type.clone(),
            i.record.alias.clone(),
            Some(i.record.source_file.clone()),
        ),
        None => (String::new(), key.to_string(), None),
    };

    let mut action = Action::new(ChangeOutcome::Fail, entity_type, key, name).with_message(format!(
        "key {} is both removed by {} and written by {}",
        key,
        describe(ChangeOutcome::is_removal),
        describe(ChangeOutcome::is_upsert)
    ));
    action.file_path = file;
    action
}
