use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A handy shortcut to replace the `RwLock` `.write().unwrap()` /
/// `.read().unwrap()` pattern with `.wl()` / `.rl()`.
///
/// Lifted verbatim from the pattern `small-db` borrows from tikv: a lock
/// poisoned by a panicking holder is a programmer error elsewhere in the
/// process, not a condition any caller here is expected to recover from.
pub trait HandyRwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T>;
    fn rl(&self) -> RwLockReadGuard<'_, T>;
}

impl<T> HandyRwLock<T> for RwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap()
    }

    fn rl(&self) -> RwLockReadGuard<'_, T> {
        self.read().unwrap()
    }
}
