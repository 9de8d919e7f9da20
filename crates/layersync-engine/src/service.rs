//! Batch surface
//!
//! `SyncService` runs the five batch kinds. Every batch:
//! 1. begins a `BatchContext` (fresh clean index, batch id)
//! 2. asks the observer whether to start; a cancel ends it untouched
//! 3. batches that write to the store take the single-flight gate, and
//!    every batch reading snapshots checks each root's version marker
//!    before anything else
//! 4. runs, logs its end with an action summary and notifies the observer

#![allow(clippy::result_large_err)]

use std::path::Path;

use layersync_core::context::BatchContext;
use layersync_core::errors::{ExError, ExErrorKind, SyncError};
use layersync_core::model::{Action, ActionSummary};
use layersync_core::settings::SyncSettings;
use layersync_core::store::EntityStore;
use layersync_core::{log_op_end, log_op_error, log_op_start};
use layersync_core_types::BatchKind;
use layersync_store::layers::{LayeredFolderSet, Page};
use layersync_store::version::check_root;

use crate::callbacks::{BatchCallbacks, StartDecision};
use crate::clean::{dedup_by_key, reconcile, CleanScope, CleanSource};
use crate::export::{export_all, ExportRequest};
use crate::gate;
use crate::handlers::{HandlerRegistry, ResolvedHandler, TypeFilter};
use crate::import::{run_post_processors, ImportOptions, ImportRun};
use crate::plan::plan_batch;
use crate::report::build_report;

/// Per-call batch options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Import unchanged records anyway
    pub force: bool,
    /// Reconcile whole type folders; `None` uses `clean_on_import`
    pub clean: Option<bool>,
    pub types: TypeFilter,
}

impl SyncOptions {
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = Some(clean);
        self
    }

    pub fn with_types(mut self, types: TypeFilter) -> Self {
        self.types = types;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SyncService {
    registry: HandlerRegistry,
    settings: SyncSettings,
}

impl SyncService {
    pub fn new(registry: HandlerRegistry, settings: SyncSettings) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// What an import would do, without touching the store.
    ///
    /// # Errors
    ///
    /// `Cancelled`, `VersionMismatch`, `UnknownEntityType`, or `Io` when a
    /// root cannot be scanned.
    pub fn report(
        &self,
        store: &dyn EntityStore,
        layers: &LayeredFolderSet,
        options: &SyncOptions,
        mut callbacks: BatchCallbacks<'_>,
    ) -> Result<Vec<Action>, ExError> {
        self.run_batch(BatchKind::Report, &mut callbacks, |ctx, callbacks| {
            check_roots(layers)?;
            let handlers = self.registry.resolve(&self.settings, &options.types)?;
            let plan = plan_batch(
                handlers,
                layers,
                &self.settings.extension,
                store,
                options.force,
                None,
            )?;
            Ok(build_report(
                store,
                &plan,
                self.clean_source(layers),
                ctx.clean_index_mut(),
                self.clean_enabled(options),
                callbacks,
            ))
        })
    }

    /// Import every selected type from `layers`.
    ///
    /// # Errors
    ///
    /// Same as `report`. Per-record failures are actions, not errors.
    pub fn import(
        &self,
        store: &mut dyn EntityStore,
        layers: &LayeredFolderSet,
        options: &SyncOptions,
        mut callbacks: BatchCallbacks<'_>,
    ) -> Result<Vec<Action>, ExError> {
        let import_options = ImportOptions {
            clean_whole_types: self.clean_enabled(options),
            run_post_import: true,
        };
        self.run_batch(BatchKind::Import, &mut callbacks, |ctx, callbacks| {
            self.import_under_gate(&mut *store, layers, options, None, import_options, ctx, callbacks)
        })
    }

    /// Import one page of each selected type's ordered records.
    ///
    /// Clean markers on the page are honoured. Whole-type cleaning and
    /// post-import processors are left to `perform_post_import`, which the
    /// caller runs once after the last page.
    ///
    /// # Errors
    ///
    /// Same as `import`.
    pub fn import_page(
        &self,
        store: &mut dyn EntityStore,
        layers: &LayeredFolderSet,
        options: &SyncOptions,
        page: Page,
        mut callbacks: BatchCallbacks<'_>,
    ) -> Result<Vec<Action>, ExError> {
        let import_options = ImportOptions {
            clean_whole_types: false,
            run_post_import: false,
        };
        self.run_batch(BatchKind::Import, &mut callbacks, |ctx, callbacks| {
            tracing::debug!(page = page.number, page_size = page.size, "importing page");
            self.import_under_gate(&mut *store, layers, options, Some(page), import_options, ctx, callbacks)
        })
    }

    /// Export every selected type's live entities under `root`.
    ///
    /// # Errors
    ///
    /// `Cancelled`, `UnknownEntityType`, or `Io` when a type folder cannot
    /// be wiped or the version marker written.
    pub fn export(
        &self,
        store: &dyn EntityStore,
        root: &Path,
        options: &SyncOptions,
        mut callbacks: BatchCallbacks<'_>,
    ) -> Result<Vec<Action>, ExError> {
        self.run_batch(BatchKind::Export, &mut callbacks, |_ctx, callbacks| {
            let handlers = self.registry.resolve(&self.settings, &options.types)?;
            let request = ExportRequest {
                root,
                extension: &self.settings.extension,
                wipe_type_folders: self.settings.clean_export_folder,
            };
            export_all(store, &handlers, request, callbacks)
        })
    }

    /// Finish a paged import: whole-type clean when enabled, then each
    /// type's post-import processor with the accumulated `actions`.
    ///
    /// Returns only the actions produced here.
    ///
    /// # Errors
    ///
    /// `Cancelled` or `UnknownEntityType`.
    pub fn perform_post_import(
        &self,
        store: &mut dyn EntityStore,
        layers: &LayeredFolderSet,
        actions: &[Action],
        options: &SyncOptions,
        mut callbacks: BatchCallbacks<'_>,
    ) -> Result<Vec<Action>, ExError> {
        self.run_batch(BatchKind::PostImport, &mut callbacks, |ctx, _callbacks| {
            let handlers = self.registry.resolve(&self.settings, &options.types)?;

            let mut produced = Vec::new();
            if self.clean_enabled(options) {
                produced.extend(self.clean_whole_types(&mut *store, layers, &handlers, ctx));
            }

            let mut seen_by_processors = actions.to_vec();
            seen_by_processors.extend(produced.iter().cloned());
            produced.extend(run_post_processors(
                &mut *store,
                &handlers,
                layers.roots(),
                &seen_by_processors,
            ));
            Ok(produced)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn import_under_gate(
        &self,
        store: &mut dyn EntityStore,
        layers: &LayeredFolderSet,
        options: &SyncOptions,
        page: Option<Page>,
        import_options: ImportOptions,
        ctx: &mut BatchContext,
        callbacks: &mut BatchCallbacks<'_>,
    ) -> Result<Vec<Action>, ExError> {
        check_roots(layers)?;
        let handlers = self.registry.resolve(&self.settings, &options.types)?;
        let plan = plan_batch(
            handlers,
            layers,
            &self.settings.extension,
            &*store,
            options.force,
            page,
        )?;
        ImportRun::new(store, self.clean_source(layers), ctx, callbacks).run(plan, import_options)
    }

    fn clean_whole_types(
        &self,
        store: &mut dyn EntityStore,
        layers: &LayeredFolderSet,
        handlers: &[ResolvedHandler<'_>],
        ctx: &mut BatchContext,
    ) -> Vec<Action> {
        let mut seen = std::collections::HashSet::new();
        let mut actions = Vec::new();
        for handler in handlers {
            let Some(cleaner) = handler.registration.cleaner.as_deref() else {
                continue;
            };
            let scope = CleanScope::whole_type(handler.entity_type(), &handler.folder);
            let removed = reconcile(
                store,
                cleaner,
                ctx.clean_index_mut(),
                self.clean_source(layers),
                &scope,
                false,
            );
            actions.extend(dedup_by_key(removed, &mut seen));
        }
        actions
    }

    fn clean_enabled(&self, options: &SyncOptions) -> bool {
        options.clean.unwrap_or(self.settings.clean_on_import)
    }

    fn clean_source<'a>(&'a self, layers: &'a LayeredFolderSet) -> CleanSource<'a> {
        CleanSource {
            layers,
            extension: &self.settings.extension,
        }
    }

    /// Shared batch lifecycle around `body`
    fn run_batch<'c, F>(
        &self,
        kind: BatchKind,
        callbacks: &mut BatchCallbacks<'c>,
        body: F,
    ) -> Result<Vec<Action>, ExError>
    where
        F: FnOnce(&mut BatchContext, &mut BatchCallbacks<'c>) -> Result<Vec<Action>, ExError>,
    {
        let op = kind.as_str();
        let mut ctx = BatchContext::begin(kind);
        let batch_id = ctx.batch_id().clone();
        log_op_start!(op, batch_id = batch_id.as_str());

        if let StartDecision::Cancel(reason) = callbacks.observer.starting(kind, &batch_id) {
            let err = ExError::from(SyncError::Cancelled { reason })
                .with_op(op)
                .with_batch_id(batch_id.clone());
            log_op_error!(op, err.clone(), duration_ms = ctx.elapsed_ms(), batch_id = batch_id.as_str());
            return Err(err);
        }

        // Anything that writes to the store runs single flight
        let _gate = kind.mutates_store().then(gate::acquire);
        match body(&mut ctx, callbacks) {
            Ok(actions) => {
                let summary = ActionSummary::from_actions(&actions);
                log_op_end!(
                    op,
                    duration_ms = ctx.elapsed_ms(),
                    batch_id = batch_id.as_str(),
                    action_count = actions.len(),
                    summary = %summary
                );
                callbacks.observer.completed(kind, &batch_id, &actions);
                Ok(actions)
            }
            Err(err) => {
                let err = if err.batch_id().is_some() {
                    err
                } else {
                    err.with_batch_id(batch_id.clone())
                };
                log_op_error!(op, err.clone(), duration_ms = ctx.elapsed_ms(), batch_id = batch_id.as_str());
                Err(err)
            }
        }
    }
}

/// Every root must carry a compatible version marker, or none at all
fn check_roots(layers: &LayeredFolderSet) -> Result<(), ExError> {
    if layers.is_empty() {
        return Err(ExError::new(ExErrorKind::InvalidInput)
            .with_op("check_roots")
            .with_message("no snapshot roots given"));
    }
    for root in layers.roots() {
        check_root(root)?;
    }
    Ok(())
}
