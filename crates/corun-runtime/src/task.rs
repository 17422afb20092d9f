//! Tasks and task handles
//!
//! A [`Task`] is one top-level submission together with its explicit call
//! stack: the root frame at the bottom, the active frame on top. Every
//! frame below the top is a parent waiting in `StartCoroutine` for the
//! frame above it. Queues and the I/O-wait registry hold tasks by value,
//! so a task (and every coroutine in it) lives in exactly one place.
//!
//! A [`TaskHandle`] is the submitter's side: a one-shot slot the owning
//! processor fills when the root frame finishes, fails or is cancelled.

use corun_core::{CoroutineError, Frame, TaskId};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Final result of a top-level coroutine
pub type TaskResult = Result<(), CoroutineError>;

struct Shared {
    id: TaskId,
    slot: Mutex<Option<TaskResult>>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Option<TaskResult>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create the two ends of a task's completion slot
pub(crate) fn completion_pair(id: TaskId) -> (Completion, TaskHandle) {
    let shared = Arc::new(Shared {
        id,
        slot: Mutex::new(None),
        cond: Condvar::new(),
    });
    (
        Completion {
            shared: shared.clone(),
        },
        TaskHandle { shared },
    )
}

/// Processor-side end of the completion slot.
///
/// Dropping it without completing reports the task as cancelled, so a
/// waiter can never hang on a task that no longer exists.
pub(crate) struct Completion {
    shared: Arc<Shared>,
}

impl Completion {
    pub(crate) fn complete(self, result: TaskResult) {
        self.fill(result);
    }

    fn fill(&self, result: TaskResult) {
        let mut slot = self.shared.lock();
        if slot.is_none() {
            *slot = Some(result);
            self.shared.cond.notify_all();
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.fill(Err(CoroutineError::cancelled()));
    }
}

/// Submitter's view of a top-level coroutine.
///
/// Cheap to clone; every clone observes the same result.
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<Shared>,
}

impl TaskHandle {
    #[inline]
    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    /// Index of the processor that owns the task
    #[inline]
    pub fn processor(&self) -> usize {
        self.shared.id.processor()
    }

    pub fn is_done(&self) -> bool {
        self.shared.lock().is_some()
    }

    /// Result if the task has completed, without blocking
    pub fn try_result(&self) -> Option<TaskResult> {
        self.shared.lock().clone()
    }

    /// Block until the task completes.
    ///
    /// Must not be called from a step: it would block the processor that
    /// has to complete the task.
    pub fn wait(&self) -> TaskResult {
        let mut slot = self.shared.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self
                .shared
                .cond
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block up to `timeout`; `None` if the task is still running
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskResult> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return Some(result.clone());
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return None;
            }
            slot = self
                .shared
                .cond
                .wait_timeout(slot, left)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("done", &self.is_done())
            .finish()
    }
}

/// A top-level submission and its call stack
pub(crate) struct Task {
    id: TaskId,
    stack: Vec<Box<dyn Frame>>,
    completion: Completion,
    /// Last signal was an un-gated `IoRepeat` retry
    pub(crate) io_retried: bool,
}

impl Task {
    pub(crate) fn new(id: TaskId, root: Box<dyn Frame>, completion: Completion) -> Self {
        Self {
            id,
            stack: vec![root],
            completion,
            io_retried: false,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    /// Number of frames (root plus live children)
    #[inline]
    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The active frame.
    ///
    /// # Panics
    ///
    /// Panics on an empty stack; the processor never keeps one.
    pub(crate) fn top_mut(&mut self) -> &mut dyn Frame {
        match self.stack.last_mut() {
            Some(frame) => frame.as_mut(),
            None => panic!("task {} has no frames", self.id),
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, child: Box<dyn Frame>) {
        self.stack.push(child);
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Option<Box<dyn Frame>> {
        self.stack.pop()
    }

    pub(crate) fn complete(self, result: TaskResult) {
        self.completion.complete(result);
    }

    /// Notify and drop every frame, innermost first, then report the task
    /// cancelled.
    ///
    /// A panicking `on_cancel` or `Drop` is logged and does not stop the others.
    pub(crate) fn cancel(mut self) {
        while let Some(mut frame) = self.stack.pop() {
            let name = frame.name();
            let notify = move || {
                frame.cancel();
                drop(frame);
            };
            if catch_unwind(AssertUnwindSafe(notify)).is_err() {
                log::warn!("task {}: cancelling {} panicked", self.id, name);
            }
        }
        self.completion.complete(Err(CoroutineError::cancelled()));
    }
}
