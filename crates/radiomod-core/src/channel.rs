//! Bounded blocking channel with an explicit close lifecycle
//!
//! The pipeline stages hand samples and bits to each other through this
//! queue. It differs from a plain MPSC channel in two ways the shutdown
//! sequence depends on:
//!
//! - either side may call [`BoundedChannel::close`]; the call is idempotent
//!   and wakes every thread blocked in `put` or `get`, and
//! - items queued before the close are still delivered (drain-then-close),
//!   so a consumer only observes [`GetError::Closed`] once the queue is
//!   empty.
//!
//! A `get` timeout on an open channel is a distinct outcome from a closed
//! channel. Consumers must check [`BoundedChannel::is_closed`] before
//! treating a timeout as end-of-stream.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Outcome of a failed [`BoundedChannel::put`]; returns the rejected item
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PutError<T> {
    /// No slot became free within the timeout; the channel is still open
    #[error("put timed out on open channel")]
    Timeout(T),

    /// The channel was closed; no further puts will ever succeed
    #[error("put on closed channel")]
    Closed(T),
}

impl<T> PutError<T> {
    /// Recover the item that was not accepted
    pub fn into_inner(self) -> T {
        match self {
            PutError::Timeout(item) | PutError::Closed(item) => item,
        }
    }
}

/// Outcome of a failed [`BoundedChannel::get`]
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum GetError {
    /// No item arrived within the timeout; the channel is still open
    #[error("get timed out on open channel")]
    Timeout,

    /// The channel is closed and fully drained
    #[error("channel closed and drained")]
    Closed,
}

struct Inner<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity FIFO shared by one producer and one consumer thread
pub struct BoundedChannel<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedChannel<T> {
    /// Create a channel holding at most `capacity` items
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "channel capacity must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Insert an item, blocking until a slot is free, the timeout elapses,
    /// or the channel is closed, whichever comes first
    pub fn put(&self, item: T, timeout: Duration) -> Result<(), PutError<T>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().expect("channel lock poisoned");

        loop {
            if inner.closed {
                return Err(PutError::Closed(item));
            }
            if inner.queue.len() < self.capacity {
                inner.queue.push_back(item);
                self.not_empty.notify_one();
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PutError::Timeout(item));
            }
            let (guard, _) = self
                .not_full
                .wait_timeout(inner, deadline - now)
                .expect("channel lock poisoned");
            inner = guard;
        }
    }

    /// Remove the oldest item, blocking until one is available, the timeout
    /// elapses, or the channel is closed and drained
    pub fn get(&self, timeout: Duration) -> Result<T, GetError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().expect("channel lock poisoned");

        loop {
            if let Some(item) = inner.queue.pop_front() {
                self.not_full.notify_one();
                return Ok(item);
            }
            // Queue is empty; a close is only reported once drained.
            if inner.closed {
                return Err(GetError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(GetError::Timeout);
            }
            let (guard, _) = self
                .not_empty
                .wait_timeout(inner, deadline - now)
                .expect("channel lock poisoned");
            inner = guard;
        }
    }

    /// Close the channel. Idempotent; wakes every blocked `put`/`get`.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("channel lock poisoned");
        if !inner.closed {
            inner.closed = true;
            self.not_empty.notify_all();
            self.not_full.notify_all();
        }
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("channel lock poisoned").closed
    }

    /// Number of items currently queued
    pub fn len(&self) -> usize {
        self.inner.lock().expect("channel lock poisoned").queue.len()
    }

    /// Whether the queue is currently empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of items the channel can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
