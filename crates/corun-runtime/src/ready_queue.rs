//! Per-processor ready queue
//!
//! Plain FIFO, single priority. Only the owning processor thread touches
//! it, so no locking. `push_front` gives a freshly started child
//! depth-first preference over already-ready work.

use std::collections::VecDeque;

/// FIFO of tasks due for immediate execution
#[derive(Debug)]
pub struct ReadyQueue<T> {
    queue: VecDeque<T>,
}

impl<T> ReadyQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push_back(&mut self, task: T) {
        self.queue.push_back(task);
    }

    #[inline]
    pub fn push_front(&mut self, task: T) {
        self.queue.push_front(task);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take everything, front to back
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.queue.drain(..)
    }
}

impl<T> Default for ReadyQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
