//! Report batches
//!
//! A report is an import that stops before touching the store: the plan's
//! classified actions, its failures, and the deletions clean markers (and
//! the optional whole-type clean) would make, as pending `Delete`s.

use std::collections::HashSet;

use layersync_core::context::CleanKeyIndex;
use layersync_core::model::Action;
use layersync_core::store::EntityStore;

use crate::callbacks::BatchCallbacks;
use crate::clean::{dedup_by_key, pending_deletes, plan_clean, CleanScope, CleanSource};
use crate::plan::BatchPlan;

pub fn build_report(
    store: &dyn EntityStore,
    plan: &BatchPlan<'_>,
    source: CleanSource<'_>,
    index: &mut CleanKeyIndex,
    clean_whole_types: bool,
    callbacks: &mut BatchCallbacks<'_>,
) -> Vec<Action> {
    let total = plan.record_count();
    let mut actions = Vec::with_capacity(total + plan.failures.len());
    let mut seen: HashSet<String> = HashSet::new();
    let mut pending = Vec::new();

    let mut position = 0;
    for handler_plan in &plan.handlers {
        let handler = &handler_plan.handler;
        for item in &handler_plan.items {
            let mut action = item.to_action();
            position += 1;

            if item.record.is_clean_marker() && item.outcome().is_removal() {
                if let Some(cleaner) = handler.registration.cleaner.as_deref() {
                    let scope =
                        CleanScope::for_marker(&handler.folder, &item.record, handler.settings.flat_layout);
                    let candidates = plan_clean(store, cleaner, index, source, &scope);
                    let deletes = dedup_by_key(pending_deletes(&candidates), &mut seen);
                    if deletes.is_empty() {
                        action = action.into_no_change("nothing to clean");
                    }
                    pending.extend(deletes);
                }
            }

            actions.push(action);
            callbacks.report_progress(&item.record.alias, position, total);
        }
    }
    actions.extend(plan.failures.iter().cloned());

    if clean_whole_types {
        for handler_plan in &plan.handlers {
            let handler = &handler_plan.handler;
            let Some(cleaner) = handler.registration.cleaner.as_deref() else {
                continue;
            };
            let scope = CleanScope::whole_type(handler.entity_type(), &handler.folder);
            let candidates = plan_clean(store, cleaner, index, source, &scope);
            pending.extend(dedup_by_key(pending_deletes(&candidates), &mut seen));
        }
    }

    actions.extend(pending);
    actions
}
