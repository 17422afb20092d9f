//! # corun-runtime
//!
//! Run loops and threading for the corun coroutine engine.
//!
//! This crate provides:
//! - Processor: the single-threaded cooperative run loop
//! - Submission bridge: lock + wake descriptor hand-off from other threads
//! - Executor: one processor per worker thread, round-robin submission
//! - Readiness probing (`poll(2)`) and retry timers
//! - Non-blocking transfer coroutines for protocol pipelines

pub mod config;
pub mod wake;
pub mod probe;
pub mod ready_queue;
pub mod timer;
pub mod io_wait;
pub mod task;
pub mod submission;
pub mod processor;
pub mod worker;
pub mod executor;
pub mod io;

// Re-exports
pub use config::ExecutorConfig;
pub use executor::{Executor, Spawner};
pub use io::{ReadExact, WriteAll};
pub use probe::{PollProbe, ReadinessProbe};
pub use processor::{Processor, ProcessorStats};
pub use submission::{FrameFactory, Submission, SubmissionQueue};
pub use task::{TaskHandle, TaskResult};
pub use wake::WakeSignal;
pub use worker::WorkerPool;

#[cfg(not(unix))]
compile_error!("Unsupported platform");
