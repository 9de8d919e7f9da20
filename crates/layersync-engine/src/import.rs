//! Two-pass import orchestrator
//!
//! Applies a `BatchPlan` to the live store. The phases run strictly in
//! this order, enforced by `ImportStateMachine`:
//!
//! 1. FirstPass: every record in plan order. Creates and updates go
//!    through the handler's serializer, delete markers remove their entity,
//!    clean markers are queued, and records of two-pass types are collected
//!    for the second pass. In batch-save mode the written entities are
//!    saved with one bulk call when the pass ends.
//! 2. SecondPass (only when something was collected): each collected file
//!    is read again and its forward references resolved. A failure turns
//!    the record's action into `Fail`; the first pass is not rolled back.
//! 3. PostImport: queued clean markers, the optional whole-type clean, then
//!    each type's post-import processor, once, with that type's changes.
//! 4. Done

#![allow(clippy::result_large_err)]

use std::collections::HashSet;
use std::path::PathBuf;

use layersync_core::classify::ClassifiedItem;
use layersync_core::context::BatchContext;
use layersync_core::errors::{ExError, SyncError};
use layersync_core::model::{Action, ChangeOutcome, EntityRecord, LiveEntity};
use layersync_core::store::EntityStore;
use layersync_core_types::schema::EVENT_PHASE;
use layersync_core_types::BatchId;
use layersync_store::snapshot::codec::read_document;

use crate::callbacks::BatchCallbacks;
use crate::clean::{dedup_by_key, reconcile, CleanScope, CleanSource};
use crate::handlers::ResolvedHandler;
use crate::plan::BatchPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    NotStarted,
    FirstPass,
    SecondPass,
    PostImport,
    Done,
}

impl ImportPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportPhase::NotStarted => "not_started",
            ImportPhase::FirstPass => "first_pass",
            ImportPhase::SecondPass => "second_pass",
            ImportPhase::PostImport => "post_import",
            ImportPhase::Done => "done",
        }
    }

    /// SecondPass may be skipped; nothing else may.
    pub fn can_advance_to(self, next: ImportPhase) -> bool {
        matches!(
            (self, next),
            (ImportPhase::NotStarted, ImportPhase::FirstPass)
                | (ImportPhase::FirstPass, ImportPhase::SecondPass)
                | (ImportPhase::FirstPass, ImportPhase::PostImport)
                | (ImportPhase::SecondPass, ImportPhase::PostImport)
                | (ImportPhase::PostImport, ImportPhase::Done)
        )
    }
}

impl std::fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct ImportStateMachine {
    phase: ImportPhase,
    batch_id: BatchId,
}

impl ImportStateMachine {
    pub fn new(batch_id: &BatchId) -> Self {
        Self {
            phase: ImportPhase::NotStarted,
            batch_id: batch_id.clone(),
        }
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns `ExErrorKind::InvalidPhaseTransition` for any transition the
    /// protocol does not allow; the phase is left unchanged.
    pub fn advance(&mut self, next: ImportPhase) -> Result<(), ExError> {
        if !self.phase.can_advance_to(next) {
            return Err(ExError::from(SyncError::InvalidPhaseTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            })
            .with_op("import")
            .with_batch_id(self.batch_id.clone()));
        }
        tracing::info!(
            op = "import",
            event = EVENT_PHASE,
            batch_id = self.batch_id.as_str(),
            from = self.phase.as_str(),
            phase = next.as_str(),
        );
        self.phase = next;
        Ok(())
    }
}

/// What runs in the PostImport phase besides queued clean markers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Reconcile every handler's whole type folder
    pub clean_whole_types: bool,
    pub run_post_import: bool,
}

struct SecondPassItem {
    action_index: usize,
    handler_index: usize,
    record: EntityRecord,
}

struct PendingSave {
    action_index: usize,
    entity: LiveEntity,
    /// Live key the record matched by alias; removed once the new key is saved
    replaces: Option<String>,
}

struct QueuedMarker {
    action_index: usize,
    handler_index: usize,
    record: EntityRecord,
}

/// Import driver for one batch
pub struct ImportRun<'a, 'b> {
    store: &'a mut dyn EntityStore,
    source: CleanSource<'a>,
    ctx: &'a mut BatchContext,
    callbacks: &'a mut BatchCallbacks<'b>,
    machine: ImportStateMachine,
    actions: Vec<Action>,
    second_pass: Vec<SecondPassItem>,
    pending: Vec<PendingSave>,
    clean_markers: Vec<QueuedMarker>,
}

impl<'a, 'b> ImportRun<'a, 'b> {
    pub fn new(
        store: &'a mut dyn EntityStore,
        source: CleanSource<'a>,
        ctx: &'a mut BatchContext,
        callbacks: &'a mut BatchCallbacks<'b>,
    ) -> Self {
        let machine = ImportStateMachine::new(ctx.batch_id());
        Self {
            store,
            source,
            ctx,
            callbacks,
            machine,
            actions: Vec::new(),
            second_pass: Vec::new(),
            pending: Vec::new(),
            clean_markers: Vec::new(),
        }
    }

    /// Run every phase over `plan` and return one action per record plus
    /// any produced by cleaning and post-import processing.
    ///
    /// # Errors
    ///
    /// Only an out-of-order phase transition, which indicates a bug.
    /// Per-record problems are reported as `Fail` actions.
    pub fn run(mut self, plan: BatchPlan<'_>, options: ImportOptions) -> Result<Vec<Action>, ExError> {
        self.machine.advance(ImportPhase::FirstPass)?;
        self.first_pass(&plan);
        self.flush_pending();
        self.actions.extend(plan.failures.iter().cloned());

        if !self.second_pass.is_empty() {
            self.machine.advance(ImportPhase::SecondPass)?;
            self.run_second_pass(&plan);
        }

        self.machine.advance(ImportPhase::PostImport)?;
        let handlers: Vec<ResolvedHandler<'_>> =
            plan.handlers.iter().map(|h| h.handler.clone()).collect();
        self.run_clean(&handlers, options.clean_whole_types);
        if options.run_post_import {
            let extra = run_post_processors(
                &mut *self.store,
                &handlers,
                self.source.layers.roots(),
                &self.actions,
            );
            self.actions.extend(extra);
        }

        self.machine.advance(ImportPhase::Done)?;
        Ok(self.actions)
    }

    fn first_pass(&mut self, plan: &BatchPlan<'_>) {
        let total = plan.record_count();
        let mut index = 0;
        for (handler_index, handler_plan) in plan.handlers.iter().enumerate() {
            for item in &handler_plan.items {
                let action = self.apply_record(handler_index, &handler_plan.handler, item);
                tracing::debug!(
                    entity_type = action.entity_type.as_str(),
                    entity_key = action.key.as_str(),
                    outcome = action.outcome.as_str(),
                    "record applied"
                );
                self.actions.push(action);
                index += 1;
                self.callbacks.report_progress(&item.record.alias, index, total);
            }
        }
    }

    fn apply_record(
        &mut self,
        handler_index: usize,
        handler: &ResolvedHandler<'_>,
        item: &ClassifiedItem,
    ) -> Action {
        let action = item.to_action();
        let record = &item.record;
        match item.outcome() {
            ChangeOutcome::Create | ChangeOutcome::Update => {
                let serializer = handler.registration.serializer.as_ref();
                let existing = item.classification.existing.as_ref();
                let entity = match serializer.deserialize(record.document(), existing, &*self.store) {
                    Ok(entity) => entity,
                    Err(err) => return action.into_failure(format!("deserialize failed: {}", err)),
                };
                let replaces = existing
                    .filter(|live| live.key != entity.key)
                    .map(|live| live.key.clone());
                let action_index = self.actions.len();

                let action = if handler.settings.batch_save {
                    self.pending.push(PendingSave {
                        action_index,
                        entity,
                        replaces,
                    });
                    action
                } else {
                    match self.store.save(entity) {
                        Ok(()) => self.retire_replaced(action, replaces.as_deref()),
                        Err(err) => return action.into_failure(format!("save failed: {}", err)),
                    }
                };

                if serializer.is_two_pass() {
                    self.second_pass.push(SecondPassItem {
                        action_index,
                        handler_index,
                        record: record.clone(),
                    });
                }
                action
            }
            ChangeOutcome::Delete => match self.store.delete(&record.entity_type, &record.key) {
                Ok(_) => action,
                Err(err) => action.into_failure(format!("delete failed: {}", err)),
            },
            ChangeOutcome::Clean => {
                self.clean_markers.push(QueuedMarker {
                    action_index: self.actions.len(),
                    handler_index,
                    record: record.clone(),
                });
                action
            }
            ChangeOutcome::NoChange | ChangeOutcome::ParentMissing | ChangeOutcome::Fail => action,
        }
    }

    /// Delete the old live key of an entity that was matched by alias
    fn retire_replaced(&mut self, action: Action, replaces: Option<&str>) -> Action {
        let Some(old_key) = replaces else {
            return action;
        };
        match self.store.delete(&action.entity_type, old_key) {
            Ok(_) => {
                tracing::info!(
                    entity_type = action.entity_type.as_str(),
                    entity_key = action.key.as_str(),
                    replaced_key = old_key,
                    "entity re-keyed"
                );
                action
            }
            Err(err) => action.into_failure(format!("removing replaced key {} failed: {}", old_key, err)),
        }
    }

    fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        let entities: Vec<LiveEntity> = pending.iter().map(|p| p.entity.clone()).collect();
        tracing::debug!(entity_count = entities.len(), "bulk save");

        match self.store.save_many(entities) {
            Ok(()) => {
                for save in pending {
                    let action = self.actions[save.action_index].clone();
                    self.actions[save.action_index] =
                        self.retire_replaced(action, save.replaces.as_deref());
                }
            }
            Err(err) => {
                // The bulk call may have stopped part way
                tracing::warn!(
                    err_code = err.code(),
                    entity_count = pending.len(),
                    "bulk save failed, saving entities one by one"
                );
                for save in pending {
                    let action = self.actions[save.action_index].clone();
                    self.actions[save.action_index] = match self.store.save(save.entity) {
                        Ok(()) => self.retire_replaced(action, save.replaces.as_deref()),
                        Err(err) => action.into_failure(format!("batch save failed: {}", err)),
                    };
                }
            }
        }
    }

    fn run_second_pass(&mut self, plan: &BatchPlan<'_>) {
        let items = std::mem::take(&mut self.second_pass);
        for item in items {
            if self.actions[item.action_index].is_failure() {
                continue;
            }
            let serializer = plan.handlers[item.handler_index]
                .handler
                .registration
                .serializer
                .as_ref();
            if let Err(err) = self.resolve_references(serializer, &item.record) {
                tracing::warn!(
                    entity_key = item.record.key.as_str(),
                    err_code = err.code(),
                    "second pass failed"
                );
                let action = self.actions[item.action_index].clone();
                self.actions[item.action_index] = action.into_failure(format!("second pass: {}", err));
            }
        }
    }

    fn resolve_references(
        &mut self,
        serializer: &dyn layersync_core::capability::Serializer,
        record: &EntityRecord,
    ) -> Result<(), ExError> {
        // A merged record has no single file to read back
        let document = if record.merged {
            record.document().clone()
        } else {
            read_document(&record.source_file)?
        };
        let entity = self
            .store
            .get(&record.entity_type, &record.key)?
            .ok_or_else(|| -> ExError {
                SyncError::EntityNotFound {
                    entity_type: record.entity_type.clone(),
                    key: record.key.clone(),
                }
                .into()
            })?;
        let resolved = serializer.deserialize_second_pass(&document, entity, &*self.store)?;
        self.store.save(resolved)
    }

    fn run_clean(&mut self, handlers: &[ResolvedHandler<'_>], whole_types: bool) {
        let mut seen: HashSet<String> = HashSet::new();
        let markers = std::mem::take(&mut self.clean_markers);

        for marker in &markers {
            let handler = &handlers[marker.handler_index];
            let Some(cleaner) = handler.registration.cleaner.as_deref() else {
                continue;
            };
            let scope =
                CleanScope::for_marker(&handler.folder, &marker.record, handler.settings.flat_layout);
            let removed = reconcile(
                &mut *self.store,
                cleaner,
                self.ctx.clean_index_mut(),
                self.source,
                &scope,
                false,
            );
            let removed = dedup_by_key(removed, &mut seen);
            // A marker only counts as a change when it removed something
            if removed.is_empty() {
                let action = self.actions[marker.action_index].clone();
                self.actions[marker.action_index] = action.into_no_change("nothing to clean");
            }
            self.actions.extend(removed);
        }

        if !whole_types {
            return;
        }
        for handler in handlers {
            let Some(cleaner) = handler.registration.cleaner.as_deref() else {
                continue;
            };
            let scope = CleanScope::whole_type(handler.entity_type(), &handler.folder);
            let removed = reconcile(
                &mut *self.store,
                cleaner,
                self.ctx.clean_index_mut(),
                self.source,
                &scope,
                false,
            );
            self.actions.extend(dedup_by_key(removed, &mut seen));
        }
    }
}

/// Hand each type's real changes to its post-import processor, once per
/// type, in handler order. Processor errors become a `Fail` action.
pub fn run_post_processors(
    store: &mut dyn EntityStore,
    handlers: &[ResolvedHandler<'_>],
    roots: &[PathBuf],
    actions: &[Action],
) -> Vec<Action> {
    let mut produced = Vec::new();
    for handler in handlers {
        let Some(processor) = handler.registration.post_import.as_deref() else {
            continue;
        };
        let changed: Vec<Action> = actions
            .iter()
            .filter(|a| a.entity_type == handler.entity_type() && a.outcome.is_change())
            .cloned()
            .collect();
        if changed.is_empty() {
            continue;
        }

        tracing::debug!(
            entity_type = handler.entity_type(),
            action_count = changed.len(),
            "running post-import processor"
        );
        match processor.post_import(store, roots, &changed) {
            Ok(extra) => produced.extend(extra),
            Err(err) => produced.push(
                Action::new(
                    ChangeOutcome::Fail,
                    handler.entity_type(),
                    "",
                    handler.entity_type(),
                )
                .with_message(format!("post import failed: {}", err)),
            ),
        }
    }
    produced
}

#[cfg(test)]
mod tests {
    use super::*;
    use layersync_core::errors::ExErrorKind;
    use layersync_core_types::BatchKind;

    #[test]
    fn test_phase_protocol() {
        let ctx = BatchContext::begin(BatchKind::Import);
        let mut machine = ImportStateMachine::new(ctx.batch_id());
        assert_eq!(machine.phase(), ImportPhase::NotStarted);

        let err = machine.advance(ImportPhase::PostImport).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidPhaseTransition);
        assert_eq!(machine.phase(), ImportPhase::NotStarted);

        machine.advance(ImportPhase::FirstPass).unwrap();
        machine.advance(ImportPhase::PostImport).unwrap();
        assert!(machine.advance(ImportPhase::SecondPass).is_err());
        machine.advance(ImportPhase::Done).unwrap();
        assert!(machine.advance(ImportPhase::FirstPass).is_err());
    }

    #[test]
    fn test_second_pass_only_after_first() {
        assert!(ImportPhase::FirstPass.can_advance_to(ImportPhase::SecondPass));
        assert!(!ImportPhase::NotStarted.can_advance_to(ImportPhase::SecondPass));
        assert!(!ImportPhase::SecondPass.can_advance_to(ImportPhase::FirstPass));
    }
}
