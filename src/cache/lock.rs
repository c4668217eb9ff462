use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Acquire a read guard, recovering the inner state if a handler panicked while holding it.
pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        report_poisoned(target, op, "rwlock.read");
        poisoned.into_inner()
    })
}

/// Acquire a write guard, recovering the inner state if a handler panicked while holding it.
pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        report_poisoned(target, op, "rwlock.write");
        poisoned.into_inner()
    })
}

fn report_poisoned(target: &'static str, op: &'static str, lock_kind: &'static str) {
    warn!(
        op,
        target_module = target,
        lock_kind,
        result = "poisoned_recovered",
        hint = "subscriber list may be stale after panic in another thread",
        "Recovered from poisoned event channel lock"
    );
}
