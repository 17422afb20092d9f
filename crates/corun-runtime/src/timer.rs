//! Retry timers for `WAIT_RETRY`
//!
//! BinaryHeap keyed by (deadline, insertion sequence). Single-threaded:
//! the heap belongs to one processor, so unlike a shared timer backend it
//! needs no lock.
//!
//! # Complexity
//!
//! - Insert: O(log n)
//! - Expire: O(k log n) where k = number of due entries
//! - Next deadline: O(1)

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::ready_queue::ReadyQueue;

/// Heap entry ordered for a min-heap (earliest deadline first)
struct Entry<T> {
    deadline: Instant,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap; equal deadlines fire in insertion order
        match other.deadline.cmp(&self.deadline) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// Tasks waiting for a "not before" instant
pub struct RetryTimers<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> RetryTimers<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn insert(&mut self, deadline: Instant, task: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            deadline,
            seq,
            task,
        });
    }

    /// Earliest pending deadline
    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Move every task whose deadline is `<= now` to the back of `ready`,
    /// in deadline order. Returns how many moved.
    pub fn expire(&mut self, now: Instant, ready: &mut ReadyQueue<T>) -> usize {
        let mut moved = 0;
        while self.heap.peek().is_some_and(|e| e.deadline <= now) {
            if let Some(entry) = self.heap.pop() {
                ready.push_back(entry.task);
                moved += 1;
            }
        }
        moved
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove all pending tasks (unordered)
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.heap.drain().map(|e| e.task)
    }
}

impl<T> Default for RetryTimers<T> {
    fn default() -> Self {
        Self::new()
    }
}
