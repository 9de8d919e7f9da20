//! Batch callbacks
//!
//! Every batch takes a `BatchCallbacks`: an observer told when the batch
//! starts and finishes, and an optional synchronous progress callback
//! invoked after each record.

use layersync_core::model::Action;
use layersync_core_types::{BatchId, BatchKind};

/// Answer of an observer to a starting batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartDecision {
    Continue,
    /// Stop before anything is touched
    Cancel(String),
}

pub trait BatchObserver: Send + Sync {
    fn starting(&self, _kind: BatchKind, _batch_id: &BatchId) -> StartDecision {
        StartDecision::Continue
    }

    fn completed(&self, _kind: BatchKind, _batch_id: &BatchId, _actions: &[Action]) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

static NOOP: NoopObserver = NoopObserver;

/// Progress callback: `(label, index, total)` with a one-based index
pub type ProgressFn<'a> = dyn FnMut(&str, usize, usize) + 'a;

pub struct BatchCallbacks<'a> {
    pub observer: &'a dyn BatchObserver,
    pub progress: Option<&'a mut ProgressFn<'a>>,
}

impl<'a> BatchCallbacks<'a> {
    pub fn none() -> Self {
        Self {
            observer: &NOOP,
            progress: None,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn BatchObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_progress(mut self, progress: &'a mut ProgressFn<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub(crate) fn report_progress(&mut self, label: &str, index: usize, total: usize) {
        if let Some(progress) = self.progress.as_mut() {
            progress(label, index, total);
        }
    }
}

impl Default for BatchCallbacks<'_> {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for BatchCallbacks<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCallbacks")
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}
