//! Serializes queries against tile swaps.
//!
//! Queries and generator swaps both go through one re-entrant mutex. A query
//! thread that wraps several calls in a [`BatchQueryScope`] holds the lock
//! across all of them, so the inner per-call acquisitions are cheap
//! re-entries and no swap can land mid-batch. Re-entrancy also means a query
//! callback that issues another query never deadlocks against itself.

use std::cell::{Ref, RefCell, RefMut};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::tile_store::TileStore;

/// The lock around the tile store.
pub(crate) struct TileGate {
    inner: ReentrantMutex<RefCell<TileStore>>,
}

impl TileGate {
    pub(crate) fn new(store: TileStore) -> TileGate {
        TileGate {
            inner: ReentrantMutex::new(RefCell::new(store)),
        }
    }

    pub(crate) fn lock(&self) -> TileGuard<'_> {
        TileGuard {
            guard: self.inner.lock(),
        }
    }
}

/// Holds the gate; dropping releases one level of the re-entrant lock.
pub(crate) struct TileGuard<'a> {
    guard: ReentrantMutexGuard<'a, RefCell<TileStore>>,
}

impl TileGuard<'_> {
    pub(crate) fn read(&self) -> Ref<'_, TileStore> {
        self.guard.borrow()
    }

    pub(crate) fn write(&self) -> RefMut<'_, TileStore> {
        self.guard.borrow_mut()
    }
}

/// Keeps the query gate held for the scope's lifetime.
///
/// Take one from [`crate::NavMesh::begin_batch`] around a burst of queries to
/// pin the tile set; individual queries still work without it, they just
/// re-acquire per call.
pub struct BatchQueryScope<'a> {
    _guard: TileGuard<'a>,
}

impl<'a> BatchQueryScope<'a> {
    pub(crate) fn new(guard: TileGuard<'a>) -> BatchQueryScope<'a> {
        BatchQueryScope { _guard: guard }
    }
}
