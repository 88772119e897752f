//! Bounded blocking channel
//!
//! A fixed-capacity FIFO shared by every pipeline stage. Producers block while
//! the queue is full, consumers block while it is empty. Closing the channel
//! turns an empty queue into a permanent end-of-stream (`None` from [`get`]);
//! cancelling it additionally discards whatever is queued and wakes every
//! blocked caller.
//!
//! [`get`]: BoundedChannel::get

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Errors returned by [`BoundedChannel::put`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("channel cancelled")]
    Cancelled,
}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
    cancelled: bool,
}

/// Fixed-capacity blocking FIFO queue with close and cancel signals
pub struct BoundedChannel<T> {
    state: Mutex<State<T>>,
    /// Signalled when space becomes available (or on close/cancel)
    not_full: Condvar,
    /// Signalled when an item becomes available (or on close/cancel)
    not_empty: Condvar,
    capacity: usize,
    /// Mirror of the queue length for lock-free monitoring
    len: AtomicUsize,
    high_water: AtomicUsize,
}

impl<T> BoundedChannel<T> {
    /// Create a channel holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
                cancelled: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
            len: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    /// Enqueue an item, blocking while the channel is full.
    ///
    /// Fails with [`ChannelError::Closed`] after [`close`](Self::close) and with
    /// [`ChannelError::Cancelled`] after [`cancel`](Self::cancel), including
    /// when the cancel arrives while this call is blocked.
    pub fn put(&self, item: T) -> Result<(), ChannelError> {
        let mut state = self.state.lock();

        loop {
            if state.cancelled {
                return Err(ChannelError::Cancelled);
            }
            if state.closed {
                return Err(ChannelError::Closed);
            }
            if state.queue.len() < self.capacity {
                break;
            }
            self.not_full.wait(&mut state);
        }

        state.queue.push_back(item);
        let len = state.queue.len();
        self.len.store(len, Ordering::Relaxed);
        self.high_water.fetch_max(len, Ordering::Relaxed);
        drop(state);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeue the oldest item, blocking while the channel is empty.
    ///
    /// Returns `None` once the channel is closed and drained, and immediately
    /// after a cancel. Both are permanent.
    pub fn get(&self) -> Option<T> {
        let mut state = self.state.lock();

        loop {
            if state.cancelled {
                return None;
            }
            if let Some(item) = state.queue.pop_front() {
                self.len.store(state.queue.len(), Ordering::Relaxed);
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Mark that no further items will be produced. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);

        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Discard everything queued and shut the channel down for good.
    ///
    /// Every blocked `put` fails with [`ChannelError::Cancelled`] and every
    /// blocked `get` returns `None`. Returns the number of discarded items.
    pub fn cancel(&self) -> usize {
        let mut state = self.state.lock();
        state.cancelled = true;
        state.closed = true;
        let discarded = state.queue.len();
        state.queue.clear();
        self.len.store(0, Ordering::Relaxed);
        drop(state);

        self.not_empty.notify_all();
        self.not_full.notify_all();
        discarded
    }

    /// Discard everything currently queued without closing.
    pub fn drain(&self) -> usize {
        let mut state = self.state.lock();
        let discarded = state.queue.len();
        state.queue.clear();
        self.len.store(0, Ordering::Relaxed);
        drop(state);

        self.not_full.notify_all();
        discarded
    }

    /// Number of queued items (may be stale)
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest queue length observed since creation
    pub fn high_water_mark(&self) -> usize {
        self.high_water.load(Ordering::Relaxed)
    }
}
