#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{temp_root, write_snap, Snap};
use layersync_core::capability::{HandlerRegistration, PostImportProcessor};
use layersync_core::errors::ExError;
use layersync_core::model::Action;
use layersync_core::serializer::FieldSerializer;
use layersync_core::settings::SyncSettings;
use layersync_core::store::{EntityStore, MemoryStore};
use layersync_engine::callbacks::BatchCallbacks;
use layersync_engine::{HandlerRegistry, SyncOptions, SyncService};
use layersync_store::layers::LayeredFolderSet;

#[derive(Default)]
struct OverlapProbe {
    active: AtomicUsize,
    max_active: AtomicUsize,
    runs: AtomicUsize,
}

impl PostImportProcessor for OverlapProbe {
    fn post_import(
        &self,
        _store: &mut dyn EntityStore,
        _roots: &[PathBuf],
        _actions: &[Action],
    ) -> Result<Vec<Action>, ExError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[test]
fn test_concurrent_imports_are_serialized() {
    let (_temp, root) = temp_root();
    write_snap(&root, "content", "a.config", &Snap::new("a", "A"));
    let layers = LayeredFolderSet::new([&root]);

    let probe = Arc::new(OverlapProbe::default());
    let mut registry = HandlerRegistry::new();
    registry
        .register(
            HandlerRegistration::new(Arc::new(FieldSerializer::new("content")))
                .with_post_import(probe.clone()),
        )
        .unwrap();
    let service = SyncService::new(registry, SyncSettings::default());

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                // Separate stores so every import has a change to process
                let mut store = MemoryStore::new();
                service
                    .import(&mut store, &layers, &SyncOptions::default(), BatchCallbacks::none())
                    .unwrap();
            });
        }
    });

    assert_eq!(probe.runs.load(Ordering::SeqCst), 4);
    assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
}
