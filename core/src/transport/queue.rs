//! Single-consumer blocking queue with sticky termination.
//!
//! Used both as the inbound queue of a DAP session and as the request
//! manager's work queue. `push` never blocks; `pop` blocks until an item is
//! available or the queue has been terminated.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct Inner<T> {
    items: VecDeque<T>,
    terminated: bool,
}

pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                terminated: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueues `item`. A no-op once the queue has been terminated.
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock();
        if inner.terminated {
            return;
        }
        let was_empty = inner.items.is_empty();
        inner.items.push_back(item);
        if was_empty {
            self.not_empty.notify_one();
        }
    }

    /// Blocks until an item is available or the queue is terminated.
    /// Returns `None` only once termination has been observed and the
    /// queue has drained.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.terminated {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Idempotent. Wakes every blocked `pop()`; further pushes are dropped.
    pub fn terminate(&self) {
        let mut inner = self.inner.lock();
        if inner.terminated {
            return;
        }
        inner.terminated = true;
        self.not_empty.notify_all();
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.lock().terminated
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn pop_blocks_until_push() {
        let q = Arc::new(BlockingQueue::new());
        let q2 = q.clone();
        let handle = std::thread::spawn(move || q2.pop());
        std::thread::sleep(Duration::from_millis(20));
        q.push(42);
        assert_eq!(handle.join().unwrap(), Some(42));
    }

    #[test]
    fn terminate_wakes_blocked_pop_with_none() {
        let q = Arc::new(BlockingQueue::<i32>::new());
        let q2 = q.clone();
        let handle = std::thread::spawn(move || q2.pop());
        std::thread::sleep(Duration::from_millis(20));
        q.terminate();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn push_after_terminate_is_dropped() {
        let q = BlockingQueue::new();
        q.terminate();
        q.push(1);
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn fifo_order_preserved() {
        let q = BlockingQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
    }
}
