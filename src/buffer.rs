//! Bounded blocking FIFO buffer.
//!
//! [`BoundedBuffer`] is a fixed-capacity queue shared between producer and
//! consumer threads. Inserting blocks while the buffer is full and removing
//! blocks while it is empty. It is a classic monitor: one mutex guarding the
//! queue and two condition variables, one per wait predicate.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//!
//! use boundline::buffer::BoundedBuffer;
//!
//! let buffer = Arc::new(BoundedBuffer::new(2).unwrap());
//!
//! let producer = {
//!     let buffer = Arc::clone(&buffer);
//!     thread::spawn(move || {
//!         for i in 0..10 {
//!             buffer.put(i);
//!         }
//!     })
//! };
//!
//! let received: Vec<i32> = (0..10).map(|_| buffer.take()).collect();
//! producer.join().unwrap();
//! assert_eq!(received, (0..10).collect::<Vec<_>>());
//! ```

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::ConfigError;

/// A thread-safe FIFO queue with a fixed capacity.
///
/// The buffer owns queued items between [`put`](Self::put) and the matching
/// [`take`](Self::take). Share it between threads with `Arc`.
#[derive(Debug)]
pub struct BoundedBuffer<T> {
    items: Mutex<VecDeque<T>>,
    /// Signalled after every removal.
    not_full: Condvar,
    /// Signalled after every insertion.
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ZeroCapacity` if `capacity` is 0.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        Ok(Self {
            items: Mutex::new(VecDeque::new()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        })
    }

    /// Appends `item` at the tail, blocking while the buffer is full.
    pub fn put(&self, item: T) {
        let mut items = self.lock();
        while items.len() >= self.capacity {
            trace!(capacity = self.capacity, "Buffer full, waiting for a consumer");
            items = self
                .not_full
                .wait(items)
                .unwrap_or_else(PoisonError::into_inner);
        }

        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
    }

    /// Removes and returns the head item, blocking while the buffer is empty.
    ///
    /// Blocks forever if no producer ever inserts again.
    pub fn take(&self) -> T {
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                drop(items);
                self.not_full.notify_one();
                return item;
            }
            trace!(capacity = self.capacity, "Buffer empty, waiting for a producer");
            items = self
                .not_empty
                .wait(items)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Appends `item` if there is room, handing it back otherwise.
    pub fn try_put(&self, item: T) -> Result<(), T> {
        let mut items = self.lock();
        if items.len() >= self.capacity {
            return Err(item);
        }

        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the head item if one is present.
    pub fn try_take(&self) -> Option<T> {
        let item = self.lock().pop_front()?;
        self.not_full.notify_one();
        Some(item)
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lock().len() >= self.capacity
    }

    /// Maximum number of items the buffer holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Every mutation is a single push or pop, so a panicking holder can
    // never leave the queue half-updated and the poisoned guard is safe.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
