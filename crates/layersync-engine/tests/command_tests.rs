#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{content_service, temp_root, write_snap, Snap};
use layersync_core::model::ChangeOutcome;
use layersync_core::store::{EntityStore, MemoryStore};
use layersync_engine::callbacks::BatchCallbacks;
use layersync_engine::commands::engine_command::{apply_engine_command, EngineCommand};
use layersync_engine::SyncOptions;
use layersync_store::layers::{LayeredFolderSet, Page};

#[test]
fn test_report_import_export_through_commands() {
    let (temp, root) = temp_root();
    write_snap(&root, "content", "a.config", &Snap::new("a", "A"));
    write_snap(&root, "content", "b.config", &Snap::new("b", "B"));
    let layers = LayeredFolderSet::new([&root]);
    let service = content_service();
    let mut store = MemoryStore::new();

    let report = EngineCommand::Report {
        layers: layers.clone(),
        options: SyncOptions::default(),
    };
    assert_eq!(report.name(), "report");
    let reported = apply_engine_command(report, &service, &mut store, BatchCallbacks::none()).unwrap();
    assert_eq!(reported.summary.count(ChangeOutcome::Create), 2);
    assert!(store.is_empty());

    let imported = apply_engine_command(
        EngineCommand::Import {
            layers: layers.clone(),
            options: SyncOptions::default(),
        },
        &service,
        &mut store,
        BatchCallbacks::none(),
    )
    .unwrap();
    assert_eq!(imported.summary.changes(), 2);
    assert_eq!(imported.actions.len(), 2);
    assert!(store.get("content", "b").unwrap().is_some());

    let out = temp.path().join("export");
    let exported = apply_engine_command(
        EngineCommand::Export {
            root: out.clone(),
            options: SyncOptions::default(),
        },
        &service,
        &mut store,
        BatchCallbacks::none(),
    )
    .unwrap();
    assert_eq!(exported.summary.count(ChangeOutcome::Create), 2);
    assert!(out.join("content").join("a.config").is_file());
}

#[test]
fn test_paged_commands_close_with_post_import() {
    let (_temp, root) = temp_root();
    for key in ["a", "b", "c"] {
        write_snap(&root, "content", &format!("{key}.config"), &Snap::new(key, &key.to_uppercase()));
    }
    let layers = LayeredFolderSet::new([&root]);
    let service = content_service();
    let mut store = MemoryStore::new();

    let mut collected = Vec::new();
    for number in 0..2 {
        let result = apply_engine_command(
            EngineCommand::ImportPage {
                layers: layers.clone(),
                options: SyncOptions::default(),
                page: Page::new(number, 2),
            },
            &service,
            &mut store,
            BatchCallbacks::none(),
        )
        .unwrap();
        collected.extend(result.actions);
    }
    assert_eq!(collected.len(), 3);
    assert_eq!(store.len("content"), 3);

    let closing = EngineCommand::PostImport {
        layers,
        actions: collected,
        options: SyncOptions::default().with_clean(true),
    };
    assert_eq!(closing.name(), "post_import");
    let result = apply_engine_command(closing, &service, &mut store, BatchCallbacks::none()).unwrap();
    assert!(result.actions.is_empty());
}
