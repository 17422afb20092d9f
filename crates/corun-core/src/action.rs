//! The action vocabulary
//!
//! Every step of a coroutine returns exactly one [`Action`], telling the
//! processor what to do next with that coroutine. Actions are plain data;
//! the processor is the only consumer.

use crate::constants::DEFAULT_RETRY_DELAY;
use crate::coroutine::{CoFrame, Coroutine, Frame, Outcome, Value};
use crate::error::CoroutineError;

use core::fmt;
use std::os::fd::RawFd;
use std::time::Duration;

/// Readiness a coroutine waits for on a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Readable,
    Writable,
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interest::Readable => write!(f, "readable"),
            Interest::Writable => write!(f, "writable"),
        }
    }
}

/// A named step of coroutine `C`.
pub type Step<C> = fn(&mut C) -> Action<C>;

/// The parent step that receives a child's outcome.
pub type Continuation<C> = fn(&mut C, Outcome) -> Action<C>;

/// Tag of an [`Action`], one per row of the action table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Repeat,
    WaitRetry,
    IoWait,
    IoRepeat,
    StartCoroutine,
    YieldTo,
    Finish,
    Error,
}

impl ActionKind {
    /// `Finish` and `Error` end the frame that produced them
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ActionKind::Finish | ActionKind::Error)
    }
}

/// What the scheduler should do next with the coroutine that returned it.
pub enum Action<C> {
    /// Re-execute the same step on a later scheduling pass
    Repeat,

    /// Re-execute the same step once the delay has elapsed
    WaitRetry(Duration),

    /// Park until `fd` is ready for `interest`, then re-execute the same step
    IoWait { fd: RawFd, interest: Interest },

    /// The step made partial I/O progress; retry once immediately before
    /// falling back to waiting for readiness
    IoRepeat { fd: RawFd, interest: Interest },

    /// Run `child` to completion, then call `resume` on this coroutine with
    /// the child's outcome
    StartCoroutine {
        child: Box<dyn Frame>,
        resume: Continuation<C>,
    },

    /// Make `Step` the active step of this coroutine
    YieldTo(Step<C>),

    /// Complete successfully, optionally handing a value to the parent
    Finish(Option<Value>),

    /// Complete abnormally; the error goes to the parent or the submitter
    Error(CoroutineError),
}

impl<C> Action<C> {
    #[inline]
    pub fn repeat() -> Self {
        Action::Repeat
    }

    /// Retry after [`DEFAULT_RETRY_DELAY`]
    #[inline]
    pub fn wait_retry() -> Self {
        Action::WaitRetry(DEFAULT_RETRY_DELAY)
    }

    #[inline]
    pub fn wait_retry_after(delay: Duration) -> Self {
        Action::WaitRetry(delay)
    }

    #[inline]
    pub fn io_wait(fd: RawFd, interest: Interest) -> Self {
        Action::IoWait { fd, interest }
    }

    #[inline]
    pub fn io_repeat(fd: RawFd, interest: Interest) -> Self {
        Action::IoRepeat { fd, interest }
    }

    /// Start `child`; `resume` runs on this coroutine once the child is done.
    pub fn start<K: Coroutine>(child: K, resume: Continuation<C>) -> Self {
        Action::StartCoroutine {
            child: Box::new(CoFrame::new(child)),
            resume,
        }
    }

    #[inline]
    pub fn yield_to(step: Step<C>) -> Self {
        Action::YieldTo(step)
    }

    #[inline]
    pub fn finish() -> Self {
        Action::Finish(None)
    }

    pub fn finish_with<T: 'static>(value: T) -> Self {
        Action::Finish(Some(Box::new(value)))
    }

    #[inline]
    pub fn error(err: impl Into<CoroutineError>) -> Self {
        Action::Error(err.into())
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Repeat => ActionKind::Repeat,
            Action::WaitRetry(_) => ActionKind::WaitRetry,
            Action::IoWait { .. } => ActionKind::IoWait,
            Action::IoRepeat { .. } => ActionKind::IoRepeat,
            Action::StartCoroutine { .. } => ActionKind::StartCoroutine,
            Action::YieldTo(_) => ActionKind::YieldTo,
            Action::Finish(_) => ActionKind::Finish,
            Action::Error(_) => ActionKind::Error,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }
}

impl<C> fmt::Debug for Action<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Repeat => write!(f, "Repeat"),
            Action::WaitRetry(d) => write!(f, "WaitRetry({:?})", d),
            Action::IoWait { fd, interest } => write!(f, "IoWait({}, {})", fd, interest),
            Action::IoRepeat { fd, interest } => write!(f, "IoRepeat({}, {})", fd, interest),
            Action::StartCoroutine { child, .. } => write!(f, "StartCoroutine({})", child.name()),
            Action::YieldTo(_) => write!(f, "YieldTo"),
            Action::Finish(v) => write!(f, "Finish(value={})", v.is_some()),
            Action::Error(e) => write!(f, "Error({})", e),
        }
    }
}
