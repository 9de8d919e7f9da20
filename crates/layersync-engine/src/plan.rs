//! Batch planning
//!
//! Loads every selected handler's layered folders, classifies each record
//! against the live store and runs the batch-level validation across all
//! handlers at once. Report and import both start from a `BatchPlan`; only
//! import goes on to apply it.

#![allow(clippy::result_large_err)]

use std::collections::HashMap;

use layersync_core::classify::{
    classify, resolve_missing_parents, separate_clashes, ClassifiedItem, ClassifyOptions,
};
use layersync_core::errors::ExError;
use layersync_core::model::{Action, ChangeOutcome};
use layersync_core::store::EntityStore;
use layersync_store::layers::{LayerRequest, LayeredFolderSet, Page};

use crate::handlers::ResolvedHandler;

/// Classified records of one handler, in processing order
#[derive(Debug)]
pub struct HandlerPlan<'a> {
    pub handler: ResolvedHandler<'a>,
    pub items: Vec<ClassifiedItem>,
}

#[derive(Debug)]
pub struct BatchPlan<'a> {
    pub handlers: Vec<HandlerPlan<'a>>,
    /// Load, merge, classification and clash failures
    pub failures: Vec<Action>,
}

impl BatchPlan<'_> {
    pub fn record_count(&self) -> usize {
        self.handlers.iter().map(|h| h.items.len()).sum()
    }
}

/// Build the plan for `handlers`, optionally restricted to one page of each
/// handler's ordered records.
///
/// # Errors
///
/// Returns an error only when a root's type folder cannot be scanned.
/// Problems with individual records become `Fail` actions.
pub fn plan_batch<'a>(
    handlers: Vec<ResolvedHandler<'a>>,
    layers: &LayeredFolderSet,
    extension: &str,
    store: &dyn EntityStore,
    force: bool,
    page: Option<Page>,
) -> Result<BatchPlan<'a>, ExError> {
    let mut failures = Vec::new();
    let mut classified: Vec<ClassifiedItem> = Vec::new();

    for handler in &handlers {
        let registration = handler.registration;
        let request = LayerRequest::new(&handler.folder, extension)
            .with_entity_type(&registration.entity_type)
            .with_merger(registration.merger.as_deref());
        let merged = match page {
            Some(page) => layers.merge_page(&request, page)?,
            None => layers.merge(&request)?,
        };
        failures.extend(merged.failures);

        let options = ClassifyOptions {
            force,
            create_only: handler.settings.create_only,
            can_clean: registration.cleaner.is_some(),
        };

        for node in merged.nodes {
            match classify(&node.record, store, registration.serializer.as_ref(), options) {
                Ok(classification) => classified.push(ClassifiedItem {
                    record: node.record,
                    classification,
                }),
                Err(err) => failures.push(
                    Action::new(
                        ChangeOutcome::Fail,
                        node.record.entity_type.clone(),
                        node.record.key.clone(),
                        node.record.alias.clone(),
                    )
                    .with_file(&node.record.source_file)
                    .with_message(format!("classification failed: {}", err)),
                ),
            }
        }
    }

    let upgraded = resolve_missing_parents(&mut classified);
    let (kept, clashes) = separate_clashes(classified);
    if upgraded > 0 || !clashes.is_empty() {
        tracing::debug!(
            upgraded,
            clash_count = clashes.len(),
            "batch validation adjusted outcomes"
        );
    }
    failures.extend(clashes);

    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut plans: Vec<HandlerPlan<'a>> = Vec::with_capacity(handlers.len());
    for handler in handlers {
        slots.insert(handler.entity_type().to_string(), plans.len());
        plans.push(HandlerPlan {
            handler,
            items: Vec::new(),
        });
    }
    for item in kept {
        if let Some(&slot) = slots.get(&item.record.entity_type) {
            plans[slot].items.push(item);
        }
    }

    Ok(BatchPlan {
        handlers: plans,
        failures,
    })
}
