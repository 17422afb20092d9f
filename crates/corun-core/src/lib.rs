//! # corun-core
//!
//! Core types for the corun cooperative coroutine engine.
//!
//! This crate is platform-agnostic apart from the raw descriptor type used
//! by I/O actions. Run loops, the submission bridge and the thread pool live
//! in `corun-runtime`.
//!
//! ## Modules
//!
//! - `action` - The action vocabulary a step returns to the scheduler
//! - `coroutine` - The `Coroutine` trait, typed frames and outcomes
//! - `id` - Task identifier type
//! - `error` - Coroutine error payloads and engine errors
//! - `logger` - Leveled stderr backend for the `log` facade
//! - `env` - Environment variable utilities

pub mod action;
pub mod coroutine;
pub mod id;
pub mod error;
pub mod logger;
pub mod env;

// Re-exports for convenience
pub use action::{Action, ActionKind, Continuation, Interest, Step};
pub use coroutine::{CoFrame, Coroutine, Frame, Outcome, Signal, Value};
pub use id::TaskId;
pub use error::{CoroutineError, ErrorKind, ExecError, ExecResult};
pub use env::{env_get, env_get_bool, env_get_opt};

/// Engine-wide constants
pub mod constants {
    use std::time::Duration;

    /// Delay used by `Action::wait_retry()`
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1);

    /// Longest retry delay honoured; longer delays are clamped to it
    pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(86400 * 365);

    /// Maximum processors (worker threads) per executor
    pub const MAX_PROCESSORS: usize = 256;

    /// Smallest worker stack accepted by the config validator
    pub const MIN_THREAD_STACK_SIZE: usize = 64 * 1024;
}
