//! Engine-level batch commands.

#![allow(clippy::result_large_err)]

use std::path::PathBuf;

use layersync_core::errors::ExError;
use layersync_core::model::{Action, ActionSummary};
use layersync_core::store::EntityStore;
use layersync_store::layers::{LayeredFolderSet, Page};

use crate::callbacks::BatchCallbacks;
use crate::service::{SyncOptions, SyncService};

/// Batches that can be dispatched through `apply_engine_command`.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Classify without touching the store.
    Report {
        layers: LayeredFolderSet,
        options: SyncOptions,
    },
    /// Full import, including clean and post-import processing.
    Import {
        layers: LayeredFolderSet,
        options: SyncOptions,
    },
    /// One page of an incremental import.
    ImportPage {
        layers: LayeredFolderSet,
        options: SyncOptions,
        page: Page,
    },
    /// Write the live store out under `root`.
    Export { root: PathBuf, options: SyncOptions },
    /// Close a paged import with the actions collected from its pages.
    PostImport {
        layers: LayeredFolderSet,
        actions: Vec<Action>,
        options: SyncOptions,
    },
}

impl EngineCommand {
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Report { .. } => "report",
            EngineCommand::Import { .. } => "import",
            EngineCommand::ImportPage { .. } => "import_page",
            EngineCommand::Export { .. } => "export",
            EngineCommand::PostImport { .. } => "post_import",
        }
    }
}

/// Result of applying an engine command.
#[derive(Debug, Clone)]
pub struct EngineCommandResult {
    pub actions: Vec<Action>,
    pub summary: ActionSummary,
}

impl EngineCommandResult {
    fn from_actions(actions: Vec<Action>) -> Self {
        Self {
            summary: ActionSummary::from_actions(&actions),
            actions,
        }
    }
}

/// Apply an engine command against `store`.
///
/// # Errors
///
/// Whatever the underlying batch returns.
pub fn apply_engine_command(
    cmd: EngineCommand,
    service: &SyncService,
    store: &mut dyn EntityStore,
    callbacks: BatchCallbacks<'_>,
) -> Result<EngineCommandResult, ExError> {
    let actions = match cmd {
        EngineCommand::Report { layers, options } => {
            service.report(&*store, &layers, &options, callbacks)?
        }
        EngineCommand::Import { layers, options } => {
            service.import(store, &layers, &options, callbacks)?
        }
        EngineCommand::ImportPage {
            layers,
            options,
            page,
        } => service.import_page(store, &layers, &options, page, callbacks)?,
        EngineCommand::Export { root, options } => {
            service.export(&*store, &root, &options, callbacks)?
        }
        EngineCommand::PostImport {
            layers,
            actions,
            options,
        } => service.perform_post_import(store, &layers, &actions, &options, callbacks)?,
    };
    Ok(EngineCommandResult::from_actions(actions))
}
