//! Coroutines, frames and outcomes
//!
//! A coroutine is an ordinary struct plus a set of named steps
//! (`fn(&mut Self) -> Action<Self>`). The step to run next is data held by
//! the coroutine's [`CoFrame`], never a captured native stack: suspending is
//! just returning an [`Action`] to the processor.
//!
//! The processor sees coroutines only through the object-safe [`Frame`]
//! trait. A typed frame turns the coroutine's `Action<C>` into an untyped
//! [`Signal`], applying the parts that concern the frame itself (moving the
//! step pointer for `YieldTo`, recording the continuation for
//! `StartCoroutine`) before the processor files the task.
//!
//! # Example
//!
//! ```
//! use corun_core::{Action, Coroutine, Outcome};
//!
//! struct Greeting {
//!     text: String,
//! }
//!
//! impl Coroutine for Greeting {
//!     fn act(&mut self) -> Action<Self> {
//!         self.text.push_str("hello");
//!         Action::yield_to(Self::finish_line)
//!     }
//! }
//!
//! impl Greeting {
//!     fn finish_line(&mut self) -> Action<Self> {
//!         self.text.push('\n');
//!         Action::finish_with(self.text.len())
//!     }
//! }
//! ```

use crate::action::{Action, Continuation, Interest, Step};
use crate::error::CoroutineError;

use core::fmt;
use std::any::Any;
use std::os::fd::RawFd;
use std::time::Duration;

/// Success value a finished coroutine hands to its parent.
///
/// Values never leave the processor thread, so they need not be `Send`.
pub type Value = Box<dyn Any>;

/// Result of a child coroutine, delivered to the parent's continuation
pub enum Outcome {
    Finished(Option<Value>),
    Failed(CoroutineError),
}

impl Outcome {
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self, Outcome::Finished(_))
    }

    #[inline]
    pub fn error(&self) -> Option<&CoroutineError> {
        match self {
            Outcome::Failed(e) => Some(e),
            Outcome::Finished(_) => None,
        }
    }

    pub fn into_result(self) -> Result<Option<Value>, CoroutineError> {
        match self {
            Outcome::Finished(v) => Ok(v),
            Outcome::Failed(e) => Err(e),
        }
    }

    /// Take the finish value as a `T`.
    ///
    /// A failed outcome yields its error; a missing value or a value of a
    /// different type is reported as an error too.
    pub fn into_value<T: 'static>(self) -> Result<T, CoroutineError> {
        match self.into_result()? {
            Some(v) => v
                .downcast::<T>()
                .map(|b| *b)
                .map_err(|_| CoroutineError::new("finish value has an unexpected type")),
            None => Err(CoroutineError::new("coroutine finished without a value")),
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Finished(v) => write!(f, "Finished(value={})", v.is_some()),
            Outcome::Failed(e) => write!(f, "Failed({})", e),
        }
    }
}

/// A unit of suspendable work.
///
/// `act` is the first step. Further steps are plain methods with the
/// [`Step`] signature, selected with `Action::yield_to`; continuations for
/// child coroutines have the [`Continuation`] signature.
///
/// Steps must not block: any wait is expressed by returning an action.
pub trait Coroutine: Sized + 'static {
    /// First step, run when the coroutine is scheduled for the first time
    fn act(&mut self) -> Action<Self>;

    /// Name used in logs
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Called when the processor drops this coroutine at shutdown without
    /// running it to completion. Must not block.
    fn on_cancel(&mut self) {}
}

/// Untyped action as seen by the processor
pub enum Signal {
    Repeat,
    WaitRetry(Duration),
    IoWait { fd: RawFd, interest: Interest },
    IoRepeat { fd: RawFd, interest: Interest },
    /// Child to push on top of the task's stack; the continuation is already
    /// recorded in the frame that produced this signal
    Start(Box<dyn Frame>),
    /// The frame moved its step pointer (`YieldTo`)
    Yielded,
    Finish(Option<Value>),
    Error(CoroutineError),
}

impl Signal {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Signal::Finish(_) | Signal::Error(_))
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Repeat => write!(f, "Repeat"),
            Signal::WaitRetry(d) => write!(f, "WaitRetry({:?})", d),
            Signal::IoWait { fd, interest } => write!(f, "IoWait({}, {})", fd, interest),
            Signal::IoRepeat { fd, interest } => write!(f, "IoRepeat({}, {})", fd, interest),
            Signal::Start(child) => write!(f, "Start({})", child.name()),
            Signal::Yielded => write!(f, "Yielded"),
            Signal::Finish(v) => write!(f, "Finish(value={})", v.is_some()),
            Signal::Error(e) => write!(f, "Error({})", e),
        }
    }
}

/// Object-safe view of a coroutine frame used by the processor
pub trait Frame {
    fn name(&self) -> &'static str;

    /// Run the active step once
    fn step(&mut self) -> Signal;

    /// Run the recorded continuation with a child's outcome.
    ///
    /// # Panics
    ///
    /// Panics if no continuation is recorded (`awaiting_child()` is false).
    fn resume(&mut self, outcome: Outcome) -> Signal;

    /// True between `StartCoroutine` and the matching `resume`
    fn awaiting_child(&self) -> bool;

    /// Deliver the shutdown notification
    fn cancel(&mut self);
}

/// Typed frame: a coroutine plus its step pointer and pending continuation
pub struct CoFrame<C: Coroutine> {
    coroutine: C,
    step: Step<C>,
    pending: Option<Continuation<C>>,
}

impl<C: Coroutine> CoFrame<C> {
    pub fn new(coroutine: C) -> Self {
        Self {
            coroutine,
            step: C::act,
            pending: None,
        }
    }

    pub fn coroutine(&self) -> &C {
        &self.coroutine
    }

    pub fn into_inner(self) -> C {
        self.coroutine
    }

    fn apply(&mut self, action: Action<C>) -> Signal {
        match action {
            Action::Repeat => Signal::Repeat,
            Action::WaitRetry(d) => Signal::WaitRetry(d),
            Action::IoWait { fd, interest } => Signal::IoWait { fd, interest },
            Action::IoRepeat { fd, interest } => Signal::IoRepeat { fd, interest },
            Action::StartCoroutine { child, resume } => {
                self.pending = Some(resume);
                Signal::Start(child)
            }
            Action::YieldTo(step) => {
                self.step = step;
                Signal::Yielded
            }
            Action::Finish(v) => Signal::Finish(v),
            Action::Error(e) => Signal::Error(e),
        }
    }
}

impl<C: Coroutine> Frame for CoFrame<C> {
    fn name(&self) -> &'static str {
        self.coroutine.name()
    }

    fn step(&mut self) -> Signal {
        debug_assert!(self.pending.is_none(), "step of a frame that waits for a child");
        let step = self.step;
        let action = step(&mut self.coroutine);
        self.apply(action)
    }

    fn resume(&mut self, outcome: Outcome) -> Signal {
        let Some(resume) = self.pending.take() else {
            panic!("{}: resumed without a recorded continuation", self.name());
        };
        let action = resume(&mut self.coroutine, outcome);
        self.apply(action)
    }

    fn awaiting_child(&self) -> bool {
        self.pending.is_some()
    }

    fn cancel(&mut self) {
        self.coroutine.on_cancel();
    }
}
