//! Externally synchronized heap handle.
//!
//! The core algorithm is single-threaded; this wrapper adds the one
//! piece a concurrent caller needs, a single mutex around the whole
//! heap state. Every operation takes the lock for its full duration,
//! so the sequential semantics are unchanged.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::allocator::{HeapConfig, SegList};
use crate::error::AllocError;

/// A cloneable, mutex-guarded handle to one heap.
#[derive(Debug, Clone)]
pub struct SharedSegList {
    inner: Arc<Mutex<SegList>>,
}

impl SharedSegList {
    /// Creates a shared heap with default configuration.
    pub fn new() -> Result<Self, AllocError> {
        Self::with_config(HeapConfig::default())
    }

    /// Creates a shared heap with the given configuration.
    pub fn with_config(config: HeapConfig) -> Result<Self, AllocError> {
        Ok(Self {
            inner: Arc::new(Mutex::new(SegList::with_config(config)?)),
        })
    }

    /// See [`SegList::allocate`].
    pub fn allocate(&self, size: usize) -> Option<usize> {
        self.inner.lock().allocate(size)
    }

    /// See [`SegList::release`].
    pub fn release(&self, bp: usize) {
        self.inner.lock().release(bp);
    }

    /// See [`SegList::reallocate`].
    pub fn reallocate(&self, bp: usize, size: usize) -> Option<usize> {
        self.inner.lock().reallocate(bp, size)
    }

    /// Locks the heap for a compound operation, e.g. writing payload
    /// bytes or running the invariant scan.
    pub fn lock(&self) -> MutexGuard<'_, SegList> {
        self.inner.lock()
    }
}
