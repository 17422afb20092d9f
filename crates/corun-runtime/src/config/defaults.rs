//! Library defaults for [`ExecutorConfig`](super::ExecutorConfig)

/// Upper bound on a single readiness-probe wait, in milliseconds
pub const PROBE_TIMEOUT_MS: u64 = 50;

/// Pin processor `i` to cpu `i % ncpus`
pub const PIN_THREADS: bool = false;

/// Worker thread stack size; 0 keeps the std default
pub const THREAD_STACK_SIZE: usize = 0;

/// Worker thread names are `<prefix>-<index>`
pub const THREAD_NAME_PREFIX: &str = "corun-processor";

/// Hardware concurrency as seen by this process.
///
/// `CORUN_HARDWARE_CONCURRENCY` overrides detection; if detection fails the
/// answer is 1.
pub fn hardware_concurrency() -> usize {
    match corun_core::env_get_opt::<usize>("CORUN_HARDWARE_CONCURRENCY") {
        Some(n) if n > 0 => n,
        _ => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    }
}
