//! Values that cross task boundaries.
//!
//! Tasks never share mutable state directly. A value produced by one task and
//! consumed by another goes through a [`Share`] (latest value wins) or a
//! [`Queue`] (bounded, with explicit overwrite behavior). Cancellation is a
//! [`CancelToken`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam::queue::ArrayQueue;

/// Synchronized single-value cell. Clones refer to the same cell.
#[derive(Debug)]
pub struct Share<T> {
    inner: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Share<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Share<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Share<T> {
    /// An empty cell
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    // A writer that panicked cannot leave an `Option` half-written
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the stored value
    pub fn put(&self, value: T) {
        *self.lock() = Some(value);
    }

    /// Remove and return the stored value
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}

impl<T: Clone> Share<T> {
    /// Copy of the stored value, leaving it in place
    pub fn get(&self) -> Option<T> {
        self.lock().clone()
    }
}

/// Bounded FIFO between tasks. Clones refer to the same queue.
#[derive(Debug)]
pub struct Queue<T> {
    inner: Arc<ArrayQueue<T>>,
    overwrite: bool,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            overwrite: self.overwrite,
        }
    }
}

impl<T> Queue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// With `overwrite`, pushing into a full queue drops the oldest item;
    /// without it, the new item is handed back to the caller.
    pub fn new(capacity: usize, overwrite: bool) -> Self {
        Self {
            inner: Arc::new(ArrayQueue::new(capacity.max(1))),
            overwrite,
        }
    }

    /// Enqueue an item. Returns the item that did not fit: the displaced oldest
    /// one when overwriting, otherwise the rejected new one.
    pub fn push(&self, item: T) -> Option<T> {
        if self.overwrite {
            self.inner.force_push(item)
        } else {
            self.inner.push(item).err()
        }
    }

    pub fn pop(&self) -> Option<T> {
        self.inner.pop()
    }

    /// Drain the queue and keep only the newest item
    pub fn latest(&self) -> Option<T> {
        let mut last = None;
        while let Some(item) = self.inner.pop() {
            last = Some(item);
        }
        last
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn overwrites(&self) -> bool {
        self.overwrite
    }
}

/// Cancellation flag shared by the controller and its tasks
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
