//! Bounded blocking job queue for the producer-consumer pipeline.
//!
//! [`JobQueue`] coordinates hardware callback threads (producers) with the
//! disk-writer pool (consumers). It adds three guarantees on top of the usual
//! FIFO contract:
//!
//! - **Backpressure**: with a capacity set, [`JobQueue::push`] blocks while
//!   the queue is full instead of dropping items or growing without bound.
//! - **Cooperative shutdown**: [`JobQueue::stop`] is a one-shot latch that
//!   unblocks every waiting caller. A stop never discards buffered items;
//!   consumers keep draining until the queue is empty.
//! - **Drain barrier**: [`JobQueue::wait`] blocks until every accepted item
//!   has been consumed.
//!
//! # Thread Safety
//!
//! All state lives behind one `parking_lot::Mutex`; three condition variables
//! carry the distinct wake conditions ("space available", "item available",
//! "became empty"). `push`, `pop` and `wait` are the only suspension points;
//! `len`, `stop` and `clear` never block the caller. Items are moved across
//! the queue boundary, so producer and consumer never alias the same payload.
//! When several `pop` callers are blocked, which one a given push wakes is
//! unspecified.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use vio_collect::job_queue::JobQueue;
//!
//! let queue = Arc::new(JobQueue::bounded(8));
//!
//! let producer = {
//!     let queue = Arc::clone(&queue);
//!     thread::spawn(move || {
//!         for i in 0..10 {
//!             if !queue.push(i) {
//!                 break;
//!             }
//!         }
//!         queue.stop();
//!     })
//! };
//!
//! let mut seen = Vec::new();
//! while let Some(job) = queue.pop() {
//!     seen.push(job);
//! }
//!
//! producer.join().unwrap();
//! assert_eq!(seen, (0..10).collect::<Vec<_>>());
//! ```

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// One-shot stop latch. The only transition is unset to set.
#[derive(Debug, Default)]
struct StopLatch {
    set: bool,
}

impl StopLatch {
    fn set(&mut self) {
        self.set = true;
    }

    fn is_set(&self) -> bool {
        self.set
    }
}

struct State<T> {
    items: VecDeque<T>,
    stopped: StopLatch,
    /// Number of `pop` callers currently inside the queue. Consulted only in
    /// rendezvous mode (capacity 0).
    poppers: usize,
}

/// A FIFO queue shared between producer and consumer threads.
///
/// Typically wrapped in an [`Arc`](std::sync::Arc) and cloned into every
/// producer callback and worker thread. Dropping the queue implies [`stop`],
/// so no thread can remain parked inside it at teardown.
///
/// [`stop`]: Self::stop
pub struct JobQueue<T> {
    capacity: Option<usize>,
    state: Mutex<State<T>>,
    space_available: Condvar,
    item_available: Condvar,
    became_empty: Condvar,
}

impl<T> JobQueue<T> {
    /// Create an unbounded queue; [`push`](Self::push) never blocks on
    /// capacity.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Create a queue holding at most `capacity` items.
    ///
    /// A capacity of `0` degenerates the queue into a rendezvous: a push
    /// completes only while another thread is concurrently blocked in
    /// [`pop`](Self::pop), or once the queue is stopped.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            state: Mutex::new(State {
                items: VecDeque::new(),
                stopped: StopLatch::default(),
                poppers: 0,
            }),
            space_available: Condvar::new(),
            item_available: Condvar::new(),
            became_empty: Condvar::new(),
        }
    }

    /// Append an item to the tail of the queue.
    ///
    /// Blocks while the queue is full and not stopped. Returns `false`
    /// without enqueuing if the queue is already stopped, or becomes stopped
    /// while waiting for space. A `false` result is terminal for the caller:
    /// the stop latch never resets, so retrying cannot succeed.
    #[must_use = "a false result means the queue is stopped and the item was not enqueued"]
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock();
        while !state.stopped.is_set() && !self.has_room(&state) {
            self.space_available.wait(&mut state);
        }
        if state.stopped.is_set() {
            return false;
        }
        state.items.push_back(item);
        // One push makes exactly one item available.
        self.item_available.notify_one();
        true
    }

    fn has_room(&self, state: &State<T>) -> bool {
        match self.capacity {
            None => true,
            // Rendezvous: hand over only while a consumer is parked.
            Some(0) => state.poppers > state.items.len(),
            Some(capacity) => state.items.len() < capacity,
        }
    }

    /// Remove and return the item at the head of the queue.
    ///
    /// Blocks while the queue is empty and not stopped. Returns `None` only
    /// once the queue is stopped *and* drained; until then every buffered
    /// item is still handed out in FIFO order, even after [`stop`](Self::stop).
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        state.poppers += 1;
        if self.capacity == Some(0) {
            // A parked rendezvous push may now proceed.
            self.space_available.notify_one();
        }
        loop {
            if let Some(item) = state.items.pop_front() {
                state.poppers -= 1;
                self.space_available.notify_one();
                if state.items.is_empty() {
                    self.became_empty.notify_all();
                }
                return Some(item);
            }
            if state.stopped.is_set() {
                state.poppers -= 1;
                return None;
            }
            self.item_available.wait(&mut state);
        }
    }

    /// Number of items currently buffered.
    ///
    /// A point-in-time snapshot; no ordering is guaranteed against concurrent
    /// pushes and pops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether the queue is currently empty. Same snapshot semantics as
    /// [`len`](Self::len).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Configured capacity; `None` means unbounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped.is_set()
    }

    /// Block until the queue is empty.
    ///
    /// Does not stop the queue. Any number of threads may wait concurrently;
    /// they are all released together the next time the queue empties.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !state.items.is_empty() {
            self.became_empty.wait(&mut state);
        }
    }

    /// Stop the queue.
    ///
    /// Idempotent. Wakes every thread blocked in [`push`](Self::push) or
    /// [`pop`](Self::pop). Buffered items are kept: subsequent pops drain the
    /// backlog and only return `None` once the queue is both stopped and
    /// empty. A caller wanting an abrupt halt must also call
    /// [`clear`](Self::clear).
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.stopped.set();
        // The number of blocked waiters is unknown; all must observe the
        // latch.
        self.space_available.notify_all();
        self.item_available.notify_all();
    }

    /// Discard the entire backlog.
    ///
    /// A hard reset, not part of graceful shutdown. All blocked pushers are
    /// woken, since space was freed in bulk, and threads parked in
    /// [`wait`](Self::wait) are released, since the queue is now empty.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.items.clear();
        self.space_available.notify_all();
        self.became_empty.notify_all();
    }
}

impl<T> Default for JobQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for JobQueue<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_pop_fifo() {
        let queue = JobQueue::new();
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(queue.push(3));
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_after_stop_fails_fast() {
        let queue = JobQueue::new();
        queue.stop();
        assert!(!queue.push(42));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_on_stopped_empty_returns_none() {
        let queue: JobQueue<u32> = JobQueue::new();
        queue.stop();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let queue = JobQueue::new();
        assert!(queue.push(7));
        queue.stop();
        queue.stop();
        assert!(queue.is_stopped());
        assert_eq!(queue.pop(), Some(7));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_clear_discards_backlog() {
        let queue = JobQueue::new();
        assert!(queue.push(1));
        assert!(queue.push(2));
        queue.clear();
        assert!(queue.is_empty());
        queue.stop();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_clear_unblocks_full_queue_pusher() {
        let queue = Arc::new(JobQueue::bounded(1));
        assert!(queue.push(0));

        let unblocked = Arc::new(AtomicBool::new(false));
        let pusher = {
            let queue = Arc::clone(&queue);
            let unblocked = Arc::clone(&unblocked);
            thread::spawn(move || {
                assert!(queue.push(1));
                unblocked.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!unblocked.load(Ordering::SeqCst));

        queue.clear();
        pusher.join().unwrap();
        assert!(unblocked.load(Ordering::SeqCst));
        assert_eq!(queue.pop(), Some(1));
    }

    #[test]
    fn test_clear_releases_wait() {
        let queue = Arc::new(JobQueue::new());
        assert!(queue.push(1));

        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait())
        };

        thread::sleep(Duration::from_millis(50));
        queue.clear();
        waiter.join().unwrap();
    }

    #[test]
    fn test_capacity_accessors() {
        let unbounded: JobQueue<u8> = JobQueue::new();
        assert_eq!(unbounded.capacity(), None);

        let bounded: JobQueue<u8> = JobQueue::bounded(4);
        assert_eq!(bounded.capacity(), Some(4));
    }
}
