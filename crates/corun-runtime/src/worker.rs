//! Worker thread management
//!
//! One named OS thread per processor. Threads are optionally pinned to a
//! cpu and may get a custom stack size; everything else they do is decided
//! by the worker function.

use corun_core::{ExecError, ExecResult};
use std::thread::{self, JoinHandle};

use crate::config::ExecutorConfig;

/// Pool of processor threads
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `config.num_processors` threads, each running `worker_fn(index)`.
    ///
    /// If a thread cannot be spawned the error is returned; threads started
    /// before it keep running until the caller stops them.
    pub fn spawn<F>(config: &ExecutorConfig, worker_fn: F) -> ExecResult<Self>
    where
        F: Fn(usize) + Send + Clone + 'static,
    {
        let mut handles = Vec::with_capacity(config.num_processors);
        for index in 0..config.num_processors {
            let mut builder =
                thread::Builder::new().name(format!("{}-{}", config.thread_name_prefix, index));
            if let Some(size) = config.thread_stack_size {
                builder = builder.stack_size(size);
            }

            let worker_fn = worker_fn.clone();
            let pin = config.pin_threads;
            let handle = builder
                .spawn(move || {
                    if pin {
                        match pin_current_thread(index) {
                            Ok(cpu) => log::debug!("processor {} pinned to cpu {}", index, cpu),
                            Err(e) => log::warn!("{}", e),
                        }
                    }
                    worker_fn(index);
                })
                .map_err(|source| ExecError::SpawnFailed { index, source })?;
            handles.push(handle);
        }
        Ok(Self { handles })
    }

    /// Number of threads
    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every thread to exit
    pub fn join(self) -> ExecResult<()> {
        let panicked = self
            .handles
            .into_iter()
            .map(JoinHandle::join)
            .filter(Result::is_err)
            .count();
        if panicked > 0 {
            return Err(ExecError::WorkerPanicked { count: panicked });
        }
        Ok(())
    }

    /// Release the threads without waiting for them
    pub fn detach(self) {
        drop(self.handles);
    }
}

/// Pin the calling thread to cpu `index % ncpus`. Returns the cpu.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(index: usize) -> ExecResult<usize> {
    let ncpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let cpu = index % ncpus;
    // SAFETY: cpu_set_t is plain data; CPU_SET bounds-checks against its size
    let ret = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if ret != 0 {
        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        return Err(ExecError::Affinity { index, cpu, errno });
    }
    Ok(cpu)
}

/// Pinning is only implemented on Linux
#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(index: usize) -> ExecResult<usize> {
    Err(ExecError::Affinity {
        index,
        cpu: index,
        errno: libc::ENOSYS,
    })
}
