//! Cross-thread submission bridge
//!
//! The only processor structure touched by more than one thread. Foreign
//! threads push [`Submission`]s under a short lock and ring the processor's
//! [`WakeSignal`]; the processor swaps the whole batch out in one critical
//! section.
//!
//! A submission carries a `Send` factory rather than a coroutine: the
//! coroutine is built on the processor thread, so coroutine types (which
//! may hold `Rc`s, descriptors and other thread-bound state) never need to
//! be `Send`.
//!
//! ```text
//!   submitter threads                     processor thread
//!   ─────────────────                     ────────────────
//!   submit(factory) ──lock──► pending ──drain()──► factory() ──► ready queue
//!                  └──notify──► wake fd ──probe()──┘
//! ```

use corun_core::{CoFrame, Coroutine, ExecError, ExecResult, Frame, TaskId};

use std::collections::VecDeque;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::task::{completion_pair, Completion, TaskHandle};
use crate::wake::WakeSignal;

/// Builds the root frame on the processor thread
pub type FrameFactory = Box<dyn FnOnce() -> Box<dyn Frame> + Send>;

/// Work handed to a processor from another thread
pub struct Submission {
    pub(crate) id: TaskId,
    pub(crate) factory: FrameFactory,
    pub(crate) completion: Completion,
}

impl Submission {
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }
}

struct Pending {
    queue: VecDeque<Submission>,
    stopped: bool,
}

/// Per-processor pending-submission queue
pub struct SubmissionQueue {
    index: usize,
    pending: Mutex<Pending>,
    len: AtomicUsize,
    stopped: AtomicBool,
    next_seq: AtomicU64,
    wake: WakeSignal,
}

impl SubmissionQueue {
    /// Queue for processor `index`
    pub fn new(index: usize) -> ExecResult<Self> {
        Ok(Self {
            index,
            pending: Mutex::new(Pending {
                queue: VecDeque::new(),
                stopped: false,
            }),
            len: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            next_seq: AtomicU64::new(1),
            wake: WakeSignal::new().map_err(ExecError::WakeSetup)?,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Index of the owning processor
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Allocate the next task id on this processor
    pub fn next_id(&self) -> TaskId {
        TaskId::new(
            self.index as u32,
            self.next_seq.fetch_add(1, Ordering::Relaxed),
        )
    }

    /// Enqueue a coroutine built by `factory` on the processor thread.
    ///
    /// Safe from any thread. Fails with [`ExecError::Shutdown`] once the
    /// queue is stopped.
    pub fn submit<C, F>(&self, factory: F) -> ExecResult<TaskHandle>
    where
        C: Coroutine,
        F: FnOnce() -> C + Send + 'static,
    {
        self.submit_frame(Box::new(move || {
            Box::new(CoFrame::new(factory())) as Box<dyn Frame>
        }))
    }

    /// Enqueue an already type-erased factory
    pub fn submit_frame(&self, factory: FrameFactory) -> ExecResult<TaskHandle> {
        let id = self.next_id();
        let (completion, handle) = completion_pair(id);
        {
            let mut pending = self.lock();
            if pending.stopped {
                return Err(ExecError::Shutdown);
            }
            pending.queue.push_back(Submission {
                id,
                factory,
                completion,
            });
            self.len.store(pending.queue.len(), Ordering::Release);
        }
        if let Err(e) = self.wake.notify() {
            // Still queued; the processor picks it up after its probe timeout
            log::warn!("processor {}: wake notify failed: {}", self.index, e);
        }
        Ok(handle)
    }

    /// Take every pending submission (processor thread only)
    pub fn drain(&self) -> VecDeque<Submission> {
        if self.len.load(Ordering::Acquire) == 0 {
            return VecDeque::new();
        }
        let mut pending = self.lock();
        self.len.store(0, Ordering::Release);
        std::mem::take(&mut pending.queue)
    }

    /// Number of submissions not yet taken by the processor
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further submissions and wake the processor so it can exit
    pub fn stop(&self) {
        {
            let mut pending = self.lock();
            pending.stopped = true;
            self.stopped.store(true, Ordering::Release);
        }
        if let Err(e) = self.wake.notify() {
            log::warn!("processor {}: wake notify failed: {}", self.index, e);
        }
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Descriptor the processor includes in every probe
    #[inline]
    pub fn wake_fd(&self) -> RawFd {
        self.wake.fd()
    }

    /// Reset the wake signal after the probe reported it
    pub(crate) fn clear_wake(&self) {
        if let Err(e) = self.wake.drain() {
            log::warn!("processor {}: wake drain failed: {}", self.index, e);
        }
    }
}

impl std::fmt::Debug for SubmissionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionQueue")
            .field("index", &self.index)
            .field("len", &self.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
