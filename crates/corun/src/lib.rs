//! # corun - cooperative coroutines for non-blocking I/O pipelines
//!
//! Drive protocol pipelines (request/response send and receive, body
//! streaming) over non-blocking descriptors without one OS thread per
//! connection.
//!
//! ## Features
//!
//! - **Explicit steps**: a coroutine is a struct plus named step functions;
//!   each step returns an [`Action`] instead of blocking
//! - **Nesting**: `Action::start` runs a child coroutine and resumes the
//!   parent's continuation with its outcome exactly once
//! - **I/O waits**: `IoWait` / `IoRepeat` park a coroutine on descriptor
//!   readiness, probed with `poll(2)`
//! - **Executor**: one processor per worker thread, round-robin submission
//!   from any thread, no migration
//!
//! ## Quick Start
//!
//! ```ignore
//! use corun::prelude::*;
//!
//! struct Hello;
//!
//! impl Coroutine for Hello {
//!     fn act(&mut self) -> Action<Self> {
//!         println!("hello from a processor");
//!         Action::finish()
//!     }
//! }
//!
//! fn main() -> ExecResult<()> {
//!     corun::init_logging();
//!     let executor = Executor::new(ExecutorConfig::from_env())?;
//!     executor.submit(|| Hello)?.wait().ok();
//!     executor.stop();
//!     executor.join()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   submitter threads ──submit()──► SubmissionQueue (lock + wake fd) ─┐
//!                                                                     ▼
//!   ┌──────────────── Processor (one per worker thread) ────────────────┐
//!   │ ready queue ──► step ──► Action ──► ready / retry timers / I/O wait│
//!   │        ▲                                        │                  │
//!   │        └──────────── poll(2) readiness ◄────────┘                  │
//!   └────────────────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use corun_core::{
    Action,
    ActionKind,
    CoFrame,
    Continuation,
    Coroutine,
    CoroutineError,
    ErrorKind,
    ExecError,
    ExecResult,
    Frame,
    Interest,
    Outcome,
    Signal,
    Step,
    TaskId,
    Value,
};

// Re-export logging setup
pub use corun_core::logger::{init as init_logging, set_flush_enabled, set_level as set_log_level};

// Re-export env utilities
pub use corun_core::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use corun_runtime::{
    Executor,
    ExecutorConfig,
    Processor,
    ProcessorStats,
    ReadExact,
    Spawner,
    TaskHandle,
    TaskResult,
    WriteAll,
};

/// Everything needed to write and run coroutines
pub mod prelude {
    pub use crate::{
        Action, Coroutine, CoroutineError, ExecResult, Executor, ExecutorConfig, Interest,
        Outcome, Processor, ReadExact, Spawner, TaskHandle, WriteAll,
    };
}
