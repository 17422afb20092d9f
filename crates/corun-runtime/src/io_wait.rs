//! I/O-wait registry
//!
//! Tasks parked on (descriptor, interest). Registration order is kept so
//! that tasks becoming ready in the same probe are woken in the order they
//! parked. Several tasks may wait on the same key.

use corun_core::Interest;
use std::os::fd::RawFd;

use crate::ready_queue::ReadyQueue;

/// Parked tasks, keyed by what they wait for
pub struct IoWaitRegistry<T> {
    keys: Vec<(RawFd, Interest)>,
    tasks: Vec<T>,
}

impl<T> IoWaitRegistry<T> {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn register(&mut self, fd: RawFd, interest: Interest, task: T) {
        self.keys.push((fd, interest));
        self.tasks.push(task);
    }

    /// Keys to probe; index `i` belongs to the `i`-th parked task
    #[inline]
    pub fn interests(&self) -> &[(RawFd, Interest)] {
        &self.keys
    }

    /// Move the tasks at `indices` (ascending, as reported by the probe) to
    /// the back of `ready`. Returns how many moved.
    pub fn take_ready(&mut self, indices: &[usize], ready: &mut ReadyQueue<T>) -> usize {
        if indices.is_empty() {
            return 0;
        }
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));

        let keys = std::mem::take(&mut self.keys);
        let tasks = std::mem::take(&mut self.tasks);
        self.keys.reserve(keys.len().saturating_sub(indices.len()));
        self.tasks.reserve(tasks.len().saturating_sub(indices.len()));

        let mut wanted = indices.iter().copied().peekable();
        let mut moved = 0;
        for (i, (key, task)) in keys.into_iter().zip(tasks).enumerate() {
            if wanted.peek() == Some(&i) {
                wanted.next();
                ready.push_back(task);
                moved += 1;
            } else {
                self.keys.push(key);
                self.tasks.push(task);
            }
        }
        moved
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Remove every parked task, in registration order
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.keys.clear();
        self.tasks.drain(..)
    }
}

impl<T> Default for IoWaitRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
