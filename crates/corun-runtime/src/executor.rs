//! Multi-threaded executor
//!
//! A fixed set of processors, one per worker thread. Submissions are
//! spread round-robin over the processors' inboxes; a task stays on the
//! processor it was assigned to for its whole life, children included.
//!
//! # Example
//!
//! ```ignore
//! let executor = Executor::new(ExecutorConfig::new().num_processors(4))?;
//! let handle = executor.submit(move || SendMessage::new(stream, body))?;
//! handle.wait()?;
//! executor.stop();
//! executor.join()?;
//! ```

use corun_core::{Coroutine, ExecError, ExecResult};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::ExecutorConfig;
use crate::processor::Processor;
use crate::submission::SubmissionQueue;
use crate::task::TaskHandle;
use crate::worker::WorkerPool;

struct ExecutorShared {
    inboxes: Vec<Arc<SubmissionQueue>>,
    balancer: AtomicUsize,
}

impl ExecutorShared {
    fn submit<C, F>(&self, factory: F) -> ExecResult<TaskHandle>
    where
        C: Coroutine,
        F: FnOnce() -> C + Send + 'static,
    {
        let index = self.balancer.fetch_add(1, Ordering::Relaxed) % self.inboxes.len();
        self.inboxes[index].submit(factory)
    }

    fn submit_to<C, F>(&self, index: usize, factory: F) -> ExecResult<TaskHandle>
    where
        C: Coroutine,
        F: FnOnce() -> C + Send + 'static,
    {
        match self.inboxes.get(index) {
            Some(inbox) => inbox.submit(factory),
            None => Err(ExecError::InvalidProcessor {
                index,
                count: self.inboxes.len(),
            }),
        }
    }

    fn stop(&self) {
        for inbox in &self.inboxes {
            inbox.stop();
        }
    }
}

/// Pool of processors on dedicated threads
pub struct Executor {
    shared: Arc<ExecutorShared>,
    pool: Option<WorkerPool>,
}

impl Executor {
    /// Validate `config` and start one processor thread per slot
    pub fn new(config: ExecutorConfig) -> ExecResult<Self> {
        config.validate()?;

        let inboxes = (0..config.num_processors)
            .map(|i| SubmissionQueue::new(i).map(Arc::new))
            .collect::<ExecResult<Vec<_>>>()?;
        let shared = Arc::new(ExecutorShared {
            inboxes,
            balancer: AtomicUsize::new(0),
        });

        let worker_shared = shared.clone();
        let worker_config = config.clone();
        let pool = WorkerPool::spawn(&config, move |index| {
            let inbox = worker_shared.inboxes[index].clone();
            let mut processor = Processor::new(index, inbox, &worker_config);
            if let Err(e) = processor.run() {
                log::error!("processor {} exited: {}", index, e);
            }
        });
        let pool = match pool {
            Ok(pool) => pool,
            Err(e) => {
                shared.stop();
                return Err(e);
            }
        };

        log::info!(
            "executor started: {} processors, probe timeout {:?}",
            config.num_processors,
            config.probe_timeout
        );
        Ok(Self {
            shared,
            pool: Some(pool),
        })
    }

    /// Executor configured from `CORUN_*` environment variables
    pub fn from_env() -> ExecResult<Self> {
        Self::new(ExecutorConfig::from_env())
    }

    /// Submit a coroutine built by `factory` on the next processor in
    /// round-robin order. Callable from any thread.
    pub fn submit<C, F>(&self, factory: F) -> ExecResult<TaskHandle>
    where
        C: Coroutine,
        F: FnOnce() -> C + Send + 'static,
    {
        self.shared.submit(factory)
    }

    /// Submit to a specific processor
    pub fn submit_to<C, F>(&self, index: usize, factory: F) -> ExecResult<TaskHandle>
    where
        C: Coroutine,
        F: FnOnce() -> C + Send + 'static,
    {
        self.shared.submit_to(index, factory)
    }

    /// Cloneable submission handle for other threads and for coroutines
    pub fn spawner(&self) -> Spawner {
        Spawner {
            shared: self.shared.clone(),
        }
    }

    #[inline]
    pub fn num_processors(&self) -> usize {
        self.shared.inboxes.len()
    }

    /// Ask every processor to exit. Tasks already dequeued get one more
    /// step; parked, timed and pending tasks are cancelled. Does not wait.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Block until every processor thread has exited.
    ///
    /// Without a prior `stop()` (from here or a [`Spawner`]) this waits
    /// forever.
    pub fn join(mut self) -> ExecResult<()> {
        match self.pool.take() {
            Some(pool) => pool.join(),
            None => Ok(()),
        }
    }

    /// Let the processor threads run on without this executor. They exit
    /// once a [`Spawner::stop`] is issued.
    pub fn detach(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.detach();
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            self.shared.stop();
            if let Err(e) = pool.join() {
                log::error!("executor shutdown: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("num_processors", &self.num_processors())
            .field("running", &self.pool.is_some())
            .finish()
    }
}

/// Submission handle shared across threads.
///
/// Coroutines may hold one to hand work to other processors, e.g. an
/// accept loop feeding connection handlers.
#[derive(Clone)]
pub struct Spawner {
    shared: Arc<ExecutorShared>,
}

impl Spawner {
    /// Round-robin submission, same counter as [`Executor::submit`]
    pub fn submit<C, F>(&self, factory: F) -> ExecResult<TaskHandle>
    where
        C: Coroutine,
        F: FnOnce() -> C + Send + 'static,
    {
        self.shared.submit(factory)
    }

    pub fn submit_to<C, F>(&self, index: usize, factory: F) -> ExecResult<TaskHandle>
    where
        C: Coroutine,
        F: FnOnce() -> C + Send + 'static,
    {
        self.shared.submit_to(index, factory)
    }

    #[inline]
    pub fn num_processors(&self) -> usize {
        self.shared.inboxes.len()
    }

    /// Same as [`Executor::stop`]
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.inboxes.iter().all(|inbox| inbox.is_stopped())
    }
}

impl std::fmt::Debug for Spawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spawner")
            .field("num_processors", &self.num_processors())
            .finish()
    }
}
