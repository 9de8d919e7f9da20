//! Single-flight import gate
//!
//! At most one import (full, paged or post-import) runs in the process at a
//! time. The guard releases the gate when dropped, including while
//! unwinding from a panic. A poisoned gate is recovered with a warning.

#![allow(clippy::result_large_err)]

use std::sync::{Mutex, MutexGuard, TryLockError};

use layersync_core::errors::{ExError, ExErrorKind};

static IMPORT_GATE: Mutex<()> = Mutex::new(());

/// Held for the duration of an import
#[derive(Debug)]
pub struct ImportGuard {
    _guard: MutexGuard<'static, ()>,
}

/// Wait until no other import runs, then take the gate
pub fn acquire() -> ImportGuard {
    let guard = match IMPORT_GATE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("import gate poisoned by an earlier panic; recovering");
            poisoned.into_inner()
        }
    };
    ImportGuard { _guard: guard }
}

/// Take the gate only if it is free.
///
/// # Errors
///
/// Returns `ExErrorKind::Concurrency` while another import holds the gate.
pub fn try_acquire() -> Result<ImportGuard, ExError> {
    match IMPORT_GATE.try_lock() {
        Ok(guard) => Ok(ImportGuard { _guard: guard }),
        Err(TryLockError::Poisoned(poisoned)) => {
            tracing::warn!("import gate poisoned by an earlier panic; recovering");
            Ok(ImportGuard {
                _guard: poisoned.into_inner(),
            })
        }
        Err(TryLockError::WouldBlock) => Err(ExError::new(ExErrorKind::Concurrency)
            .with_op("import_gate")
            .with_message("another import is already running")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases share the process-wide gate, so they run in one test
    #[test]
    fn test_gate_is_exclusive_and_survives_panics() {
        {
            let _held = acquire();
            let err = try_acquire().unwrap_err();
            assert_eq!(err.kind(), ExErrorKind::Concurrency);
        }
        assert!(try_acquire().is_ok());

        let result = std::thread::spawn(|| {
            let _held = acquire();
            panic!("import blew up");
        })
        .join();
        assert!(result.is_err());

        assert!(try_acquire().is_ok());
    }
}
