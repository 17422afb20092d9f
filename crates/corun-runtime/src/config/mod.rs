//! Executor configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env()` only)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use corun_runtime::config::ExecutorConfig;
//!
//! // Defaults with env overrides
//! let config = ExecutorConfig::from_env();
//!
//! // Or customize programmatically
//! let config = ExecutorConfig::new()
//!     .num_processors(4)
//!     .probe_timeout(Duration::from_millis(10));
//! ```

pub mod defaults;

use corun_core::constants::{MAX_PROCESSORS, MIN_THREAD_STACK_SIZE};
use corun_core::env::{env_get, env_get_bool, env_get_opt};
use corun_core::{ExecError, ExecResult};
use std::time::Duration;

/// Executor configuration with builder pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Number of processors, one worker thread each
    pub num_processors: usize,
    /// Longest a processor blocks in one readiness probe
    pub probe_timeout: Duration,
    /// Pin each worker thread to one cpu
    pub pin_threads: bool,
    /// Worker thread stack size (`None` = std default)
    pub thread_stack_size: Option<usize>,
    /// Worker threads are named `<prefix>-<index>`
    pub thread_name_prefix: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ExecutorConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `CORUN_NUM_PROCESSORS` - Number of processors
    /// - `CORUN_HARDWARE_CONCURRENCY` - Override detected parallelism
    /// - `CORUN_PROBE_TIMEOUT_MS` - Probe timeout in milliseconds
    /// - `CORUN_PIN_THREADS` - Pin workers to cpus (0/1)
    /// - `CORUN_THREAD_STACK_SIZE` - Worker stack size in bytes
    pub fn from_env() -> Self {
        let stack: usize = env_get("CORUN_THREAD_STACK_SIZE", defaults::THREAD_STACK_SIZE);
        Self {
            num_processors: env_get_opt("CORUN_NUM_PROCESSORS")
                .unwrap_or_else(defaults::hardware_concurrency),
            probe_timeout: Duration::from_millis(env_get(
                "CORUN_PROBE_TIMEOUT_MS",
                defaults::PROBE_TIMEOUT_MS,
            )),
            pin_threads: env_get_bool("CORUN_PIN_THREADS", defaults::PIN_THREADS),
            thread_stack_size: (stack > 0).then_some(stack),
            thread_name_prefix: defaults::THREAD_NAME_PREFIX.to_string(),
        }
    }

    /// Create config with library defaults (no env override for the
    /// explicit fields). Useful for tests.
    pub fn new() -> Self {
        Self {
            num_processors: defaults::hardware_concurrency(),
            probe_timeout: Duration::from_millis(defaults::PROBE_TIMEOUT_MS),
            pin_threads: defaults::PIN_THREADS,
            thread_stack_size: None,
            thread_name_prefix: defaults::THREAD_NAME_PREFIX.to_string(),
        }
    }

    // Builder methods

    pub fn num_processors(mut self, n: usize) -> Self {
        self.num_processors = n;
        self
    }

    pub fn probe_timeout(mut self, d: Duration) -> Self {
        self.probe_timeout = d;
        self
    }

    pub fn pin_threads(mut self, enable: bool) -> Self {
        self.pin_threads = enable;
        self
    }

    pub fn thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> ExecResult<()> {
        if self.num_processors == 0 {
            return Err(ExecError::InvalidConfig("num_processors must be > 0"));
        }
        if self.num_processors > MAX_PROCESSORS {
            return Err(ExecError::InvalidConfig("num_processors must be <= 256"));
        }
        if self.probe_timeout.is_zero() {
            return Err(ExecError::InvalidConfig("probe_timeout must be > 0"));
        }
        if let Some(size) = self.thread_stack_size {
            if size < MIN_THREAD_STACK_SIZE {
                return Err(ExecError::InvalidConfig("thread_stack_size must be >= 64KB"));
            }
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("corun configuration:");
        eprintln!("  num_processors:      {}", self.num_processors);
        eprintln!("  probe_timeout:       {:?}", self.probe_timeout);
        eprintln!("  pin_threads:         {}", self.pin_threads);
        match self.thread_stack_size {
            Some(size) => eprintln!("  thread_stack_size:   {}", size),
            None => eprintln!("  thread_stack_size:   default"),
        }
        eprintln!("  thread_name_prefix:  {}", self.thread_name_prefix);
    }
}
