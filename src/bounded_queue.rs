use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// Thread-safe FIFO queue with a blocking consumer side.
///
/// Any number of producers may push; items come out in the order the queue
/// lock accepted them, regardless of which thread pushed. The queue is
/// unbounded unless built with [`with_capacity`](Self::with_capacity), in
/// which case [`push`](Self::push) waits for room and
/// [`try_push`](Self::try_push) fails with [`Error::QueueFull`].
///
/// Closing the queue rejects further pushes and wakes every blocked thread.
/// Items already queued can still be popped.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue with no capacity limit. Pushes never block.
    pub fn unbounded() -> Self {
        Self::build(None)
    }

    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self::build(Some(capacity))
    }

    fn build(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Appends `item` to the tail, waiting while the queue is full.
    ///
    /// Fails with [`Error::QueueClosed`] if the queue is closed, including
    /// when it gets closed while this call is waiting for room.
    pub fn push(&self, item: T) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(Error::QueueClosed);
            }
            if !self.is_full(&state) {
                break;
            }
            self.not_full.wait(&mut state);
        }

        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Appends `item` to the tail without waiting.
    pub fn try_push(&self, item: T) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::QueueClosed);
        }
        if self.is_full(&state) {
            return Err(Error::QueueFull);
        }

        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes and returns the head, blocking until an item is available.
    ///
    /// Returns `None` only once the queue is closed and fully drained.
    pub fn pop_blocking(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Removes and returns the head if one is present.
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = state.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Closes the queue. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        let was_open = !state.closed;
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
        was_open
    }

    /// Appends a final `item`, ignoring the capacity limit, and closes the
    /// queue under the same lock acquisition.
    ///
    /// Nothing can be enqueued behind `item`. Fails with
    /// [`Error::QueueClosed`] if the queue was already closed.
    pub fn close_with(&self, item: T) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::QueueClosed);
        }

        state.items.push_back(item);
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn is_full(&self, state: &QueueState<T>) -> bool {
        self.capacity
            .is_some_and(|capacity| state.items.len() >= capacity)
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}
