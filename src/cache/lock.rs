use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

// Entries are replaced wholesale, so a poisoned guard still holds consistent data.
fn recover<G>(
    poisoned: PoisonError<G>,
    component: &'static str,
    op: &'static str,
    kind: &'static str,
) -> G {
    warn!(
        component,
        op,
        lock_kind = kind,
        result = "poisoned_recovered",
        "Recovered from poisoned lock"
    );
    poisoned.into_inner()
}

pub(crate) fn read_guard<'a, T>(
    lock: &'a RwLock<T>,
    component: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, component, op, "rwlock.read"))
}

pub(crate) fn write_guard<'a, T>(
    lock: &'a RwLock<T>,
    component: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, component, op, "rwlock.write"))
}

pub(crate) fn mutex_guard<'a, T>(
    lock: &'a Mutex<T>,
    component: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock()
        .unwrap_or_else(|poisoned| recover(poisoned, component, op, "mutex.lock"))
}
