//! Shared handle to a cache entry

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Handle to a cached record.
///
/// Every lookup of the same key returns a handle to the same allocation, so a
/// patch applied later is visible through handles obtained earlier. A handle
/// outliving the removal of its entry keeps the last-known state.
pub struct Cached<T>(Arc<RwLock<T>>);

impl<T> Cached<T> {
    pub(crate) fn new(record: T) -> Self {
        Self(Arc::new(RwLock::new(record)))
    }

    /// Borrow the current state. Do not hold the guard across an `.await`.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// Whether two handles refer to the same entry
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> Cached<T> {
    /// Owned copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> T {
        self.0.read().clone()
    }
}

impl<T> Clone for Cached<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Cached<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cached").field(&*self.0.read()).finish()
    }
}
