//! Single-threaded cooperative run loop
//!
//! A processor owns a ready queue, retry timers and an I/O-wait registry.
//! Each tick:
//!
//! 1. Drain the submission bridge into the ready queue.
//! 2. Expire due retry timers and probe parked descriptors, moving anything
//!    ready to the back of the ready queue. The probe is the only place the
//!    loop blocks, and only when there is no ready work.
//! 3. Pop one task, run one step of its active frame and file the task
//!    according to the returned action.
//!
//! ```text
//!   ready ──pop──► step ──► Repeat / YieldTo ────────► ready (back)
//!                       ├─► StartCoroutine ─push child► ready (front)
//!                       ├─► WaitRetry ───────────────► retry timers
//!                       ├─► IoWait / 2nd IoRepeat ───► I/O-wait registry
//!                       ├─► 1st IoRepeat ────────────► ready (back)
//!                       └─► Finish / Error ──pop frame, resume parent inline
//! ```
//!
//! A task sits in exactly one of {ready queue, retry timers, I/O-wait
//! registry, executing}; tasks move between them by value.

use corun_core::constants::MAX_RETRY_DELAY;
use corun_core::logger::{clear_processor_context, set_processor_context};
use corun_core::{CoroutineError, Coroutine, CoFrame, ExecResult, Frame, Outcome, Signal};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ExecutorConfig;
use crate::io_wait::IoWaitRegistry;
use crate::probe::{PollProbe, ReadinessProbe};
use crate::ready_queue::ReadyQueue;
use crate::submission::{Submission, SubmissionQueue};
use crate::task::{completion_pair, Task, TaskHandle};
use crate::timer::RetryTimers;

/// Counters kept by one processor
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Frame invocations (steps and continuations)
    pub steps: u64,
    /// Top-level tasks that finished
    pub finished: u64,
    /// Top-level tasks that ended with an error
    pub failed: u64,
    /// Tasks dropped by shutdown
    pub cancelled: u64,
}

/// One cooperative run loop. Not `Send`: it is built on, and never leaves,
/// the thread that runs it.
pub struct Processor {
    index: usize,
    inbox: Arc<SubmissionQueue>,
    ready: ReadyQueue<Task>,
    retries: RetryTimers<Task>,
    io_waits: IoWaitRegistry<Task>,
    probe: Box<dyn ReadinessProbe>,
    probe_timeout: Duration,
    ready_fds: Vec<usize>,
    stopping: bool,
    stats: ProcessorStats,
}

impl Processor {
    /// Processor `index` fed by `inbox`
    pub fn new(index: usize, inbox: Arc<SubmissionQueue>, config: &ExecutorConfig) -> Self {
        Self::with_probe(index, inbox, config, Box::new(PollProbe::new()))
    }

    /// Processor with a custom readiness probe
    pub fn with_probe(
        index: usize,
        inbox: Arc<SubmissionQueue>,
        config: &ExecutorConfig,
        probe: Box<dyn ReadinessProbe>,
    ) -> Self {
        Self {
            index,
            inbox,
            ready: ReadyQueue::new(),
            retries: RetryTimers::new(),
            io_waits: IoWaitRegistry::new(),
            probe,
            probe_timeout: config.probe_timeout,
            ready_fds: Vec::new(),
            stopping: false,
            stats: ProcessorStats::default(),
        }
    }

    /// Processor 0 with its own inbox, driven by the calling thread
    pub fn standalone(config: &ExecutorConfig) -> ExecResult<Self> {
        let inbox = Arc::new(SubmissionQueue::new(0)?);
        Ok(Self::new(0, inbox, config))
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Submission queue feeding this processor (shareable with other threads)
    #[inline]
    pub fn inbox(&self) -> &Arc<SubmissionQueue> {
        &self.inbox
    }

    /// Schedule a coroutine from the processor's own thread, bypassing the
    /// submission bridge. After shutdown the task is cancelled immediately.
    pub fn spawn<C: Coroutine>(&mut self, coroutine: C) -> TaskHandle {
        let id = self.inbox.next_id();
        let (completion, handle) = completion_pair(id);
        let task = Task::new(id, Box::new(CoFrame::new(coroutine)), completion);
        if self.stopping {
            self.cancel_task(task);
        } else {
            self.ready.push_back(task);
        }
        handle
    }

    /// One scheduling pass. Returns whether a step was executed.
    pub fn tick(&mut self) -> ExecResult<bool> {
        self.drain_inbox();
        self.poll_events()?;
        match self.ready.pop() {
            Some(task) => {
                self.run_task(task);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Loop until the inbox is stopped, then shut down
    pub fn run(&mut self) -> ExecResult<()> {
        set_processor_context(self.index);
        log::debug!("processor {} started", self.index);

        let result = loop {
            if self.inbox.is_stopped() {
                break Ok(());
            }
            if let Err(e) = self.tick() {
                log::error!("processor {}: {}", self.index, e);
                break Err(e);
            }
        };
        self.shutdown();

        log::debug!("processor {} stopped: {:?}", self.index, self.stats);
        clear_processor_context();
        result
    }

    /// Tick until there is nothing left: no ready, parked, timed or pending
    /// work. Blocks in the probe while only parked or timed tasks remain.
    pub fn run_until_idle(&mut self) -> ExecResult<()> {
        while !self.is_idle() {
            self.tick()?;
        }
        Ok(())
    }

    /// Stop accepting work, let every task already in the ready queue run
    /// to its next action, and cancel everything else.
    pub fn shutdown(&mut self) {
        if self.stopping {
            return;
        }
        self.inbox.stop();
        self.stopping = true;

        while let Some(task) = self.ready.pop() {
            self.run_task(task);
        }
        self.cancel_remaining();
    }

    #[inline]
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    #[inline]
    pub fn io_wait_len(&self) -> usize {
        self.io_waits.len()
    }

    #[inline]
    pub fn retry_len(&self) -> usize {
        self.retries.len()
    }

    /// Nothing ready, parked or timed, and no submission that will still
    /// be accepted
    pub fn is_idle(&self) -> bool {
        self.ready.is_empty()
            && self.io_waits.is_empty()
            && self.retries.is_empty()
            && (self.inbox.is_empty() || self.inbox.is_stopped())
    }

    #[inline]
    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    /// Accept pending submissions. A stopped inbox is left for
    /// `cancel_remaining`, which cancels without constructing.
    fn drain_inbox(&mut self) {
        if self.inbox.is_stopped() {
            return;
        }
        for submission in self.inbox.drain() {
            self.accept(submission);
        }
    }

    fn accept(&mut self, submission: Submission) {
        let Submission {
            id,
            factory,
            completion,
        } = submission;
        if self.stopping {
            self.stats.cancelled += 1;
            completion.complete(Err(CoroutineError::cancelled()));
            return;
        }
        match catch_unwind(AssertUnwindSafe(factory)) {
            Ok(root) => self.ready.push_back(Task::new(id, root, completion)),
            Err(payload) => {
                let err = CoroutineError::panic(panic_message(payload.as_ref()));
                log::warn!("task {}: constructor panicked: {}", id, err.message());
                self.stats.failed += 1;
                completion.complete(Err(err));
            }
        }
    }

    /// Expire timers and probe descriptors (step 2 of a tick)
    fn poll_events(&mut self) -> ExecResult<()> {
        let now = Instant::now();
        self.retries.expire(now, &mut self.ready);

        let busy = !self.ready.is_empty() || (!self.inbox.is_empty() && !self.inbox.is_stopped());
        if busy && self.io_waits.is_empty() {
            return Ok(());
        }

        let timeout = if busy {
            Duration::ZERO
        } else {
            match self.retries.next_deadline() {
                Some(at) => at.saturating_duration_since(now).min(self.probe_timeout),
                None => self.probe_timeout,
            }
        };

        self.ready_fds.clear();
        let woke = self.probe.probe(
            self.inbox.wake_fd(),
            self.io_waits.interests(),
            timeout,
            &mut self.ready_fds,
        )?;
        self.io_waits.take_ready(&self.ready_fds, &mut self.ready);

        if woke {
            self.inbox.clear_wake();
            self.drain_inbox();
        }
        if !timeout.is_zero() {
            self.retries.expire(Instant::now(), &mut self.ready);
        }
        Ok(())
    }

    fn run_task(&mut self, mut task: Task) {
        self.stats.steps += 1;
        let frame = task.top_mut();
        let name = frame.name();
        let signal = guarded(name, || frame.step());
        log::trace!("task {}: {} -> {:?}", task.id(), name, signal);
        self.dispatch(task, signal);
    }

    /// File `task` according to `signal`. Terminal signals pop the finished
    /// frame and resume its parent in place, looping until a non-terminal
    /// signal or the root completes.
    fn dispatch(&mut self, mut task: Task, mut signal: Signal) {
        let id = task.id();
        loop {
            if !matches!(signal, Signal::IoRepeat { .. }) {
                task.io_retried = false;
            }

            // Shutting down: the step ran, nothing gets filed again
            if self.stopping && !signal.is_terminal() {
                if let Signal::Start(child) = signal {
                    task.push(child);
                }
                self.cancel_task(task);
                return;
            }

            let outcome = match signal {
                Signal::Finish(value) => Outcome::Finished(value),
                Signal::Error(err) => Outcome::Failed(err),
                Signal::Repeat | Signal::Yielded => {
                    self.ready.push_back(task);
                    return;
                }
                Signal::WaitRetry(delay) => {
                    self.retries.insert(retry_deadline(Instant::now(), delay), task);
                    return;
                }
                Signal::IoWait { fd, interest } => {
                    self.io_waits.register(fd, interest, task);
                    return;
                }
                Signal::IoRepeat { fd, interest } => {
                    if task.io_retried {
                        task.io_retried = false;
                        self.io_waits.register(fd, interest, task);
                    } else {
                        task.io_retried = true;
                        self.ready.push_back(task);
                    }
                    return;
                }
                Signal::Start(child) => {
                    task.push(child);
                    self.ready.push_front(task);
                    return;
                }
            };

            let finished = task.pop();
            if task.depth() == 0 {
                release(finished);
                self.complete(task, outcome);
                return;
            }

            let parent = task.top_mut();
            let name = parent.name();
            assert!(
                parent.awaiting_child(),
                "task {}: {} resumed without a pending child",
                id,
                name
            );
            self.stats.steps += 1;
            signal = guarded(name, || parent.resume(outcome));
            log::trace!("task {}: {} resumed -> {:?}", id, name, signal);
            release(finished);
        }
    }

    fn complete(&mut self, task: Task, outcome: Outcome) {
        match outcome {
            Outcome::Finished(_) => {
                self.stats.finished += 1;
                task.complete(Ok(()));
            }
            Outcome::Failed(err) => {
                self.stats.failed += 1;
                log::warn!("task {} failed: {}", task.id(), err);
                task.complete(Err(err));
            }
        }
    }

    fn cancel_task(&mut self, task: Task) {
        log::debug!("task {} cancelled", task.id());
        self.stats.cancelled += 1;
        task.cancel();
    }

    fn cancel_remaining(&mut self) {
        let mut doomed: Vec<Task> = self.ready.drain().collect();
        doomed.extend(self.io_waits.drain());
        doomed.extend(self.retries.drain());
        for task in doomed {
            self.cancel_task(task);
        }
        for submission in self.inbox.drain() {
            self.accept(submission);
        }
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.stopping = true;
        self.inbox.stop();
        self.cancel_remaining();
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("index", &self.index)
            .field("ready", &self.ready.len())
            .field("io_wait", &self.io_waits.len())
            .field("retry", &self.retries.len())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Run a frame invocation, turning a panic into an `Error` signal
fn guarded(name: &'static str, f: impl FnOnce() -> Signal) -> Signal {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(signal) => signal,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            log::warn!("{} panicked: {}", name, msg);
            Signal::Error(CoroutineError::panic(msg))
        }
    }
}

/// Deadline for a `WaitRetry`, clamped so it cannot overflow `Instant`
fn retry_deadline(now: Instant, delay: Duration) -> Instant {
    let delay = delay.min(MAX_RETRY_DELAY);
    now.checked_add(delay).unwrap_or(now)
}

/// Drop a finished frame; a panicking `Drop` is logged, not propagated
fn release(frame: Option<Box<dyn Frame>>) {
    let Some(frame) = frame else { return };
    let name = frame.name();
    if let Err(payload) = catch_unwind(AssertUnwindSafe(move || drop(frame))) {
        log::warn!("{} panicked on drop: {}", name, panic_message(payload.as_ref()));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corun_core::{Action, ErrorKind, Interest};
    use std::cell::{Cell, RefCell};
    use std::io::{Read, Write};
    use std::os::fd::{AsRawFd, RawFd};
    use std::os::unix::net::UnixStream;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    fn processor() -> Processor {
        let config = ExecutorConfig::new().probe_timeout(Duration::from_millis(20));
        Processor::standalone(&config).unwrap()
    }

    fn live(p: &Processor) -> usize {
        p.ready_len() + p.io_wait_len() + p.retry_len()
    }

    struct Once;

    impl Coroutine for Once {
        fn act(&mut self) -> Action<Self> {
            Action::finish()
        }
    }

    #[test]
    fn test_simple_finish_takes_one_pass() {
        let mut p = processor();
        let h = p.spawn(Once);
        assert!(p.tick().unwrap());
        assert_eq!(h.try_result(), Some(Ok(())));
        assert_eq!(p.stats().steps, 1);
        assert_eq!(p.stats().finished, 1);
        assert!(p.is_idle());
        assert!(!p.tick().unwrap());
    }

    struct Spinner {
        id: usize,
        left: usize,
        log: Rc<RefCell<Vec<usize>>>,
    }

    impl Coroutine for Spinner {
        fn act(&mut self) -> Action<Self> {
            self.log.borrow_mut().push(self.id);
            if self.left == 0 {
                return Action::finish();
            }
            self.left -= 1;
            Action::repeat()
        }
    }

    #[test]
    fn test_repeat_is_fair() {
        let mut p = processor();
        let log = Rc::new(RefCell::new(Vec::new()));
        for id in 0..3 {
            p.spawn(Spinner {
                id,
                left: 2,
                log: log.clone(),
            });
        }
        p.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_single_ownership_across_ticks() {
        let mut p = processor();
        let (a, _b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let fd = a.as_raw_fd();

        struct Parker(RawFd);
        impl Coroutine for Parker {
            fn act(&mut self) -> Action<Self> {
                Action::io_wait(self.0, Interest::Readable)
            }
        }
        struct Sleeper;
        impl Coroutine for Sleeper {
            fn act(&mut self) -> Action<Self> {
                Action::wait_retry_after(Duration::from_secs(60))
            }
        }

        let log = Rc::new(RefCell::new(Vec::new()));
        p.spawn(Parker(fd));
        p.spawn(Sleeper);
        p.spawn(Spinner {
            id: 0,
            left: 3,
            log,
        });
        assert_eq!(live(&p), 3);

        for _ in 0..3 {
            p.tick().unwrap();
            assert_eq!(live(&p), 3);
        }
        assert_eq!(p.io_wait_len(), 1);
        assert_eq!(p.retry_len(), 1);
        assert_eq!(p.ready_len(), 1);
    }

    struct Reentrancy {
        busy: Rc<Cell<bool>>,
        left: usize,
    }

    impl Coroutine for Reentrancy {
        fn act(&mut self) -> Action<Self> {
            assert!(!self.busy.replace(true), "step re-entered");
            self.left -= 1;
            let next = if self.left == 0 {
                Action::finish()
            } else if self.left % 2 == 0 {
                Action::start(Once, Self::resumed)
            } else {
                Action::yield_to(Self::act)
            };
            self.busy.set(false);
            next
        }
    }

    impl Reentrancy {
        fn resumed(&mut self, _: Outcome) -> Action<Self> {
            assert!(!self.busy.get(), "continuation during a step");
            Action::repeat()
        }
    }

    #[test]
    fn test_steps_never_reenter() {
        let mut p = processor();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                p.spawn(Reentrancy {
                    busy: Rc::new(Cell::new(false)),
                    left: 9,
                })
            })
            .collect();
        p.run_until_idle().unwrap();
        for h in handles {
            assert_eq!(h.try_result(), Some(Ok(())));
        }
    }

    /// Parent -> child -> grandchild, each logging its steps
    struct Parent {
        log: Log,
        resumed: usize,
    }

    impl Coroutine for Parent {
        fn act(&mut self) -> Action<Self> {
            self.log.borrow_mut().push("parent:start".into());
            Action::start(Child { log: self.log.clone() }, Self::on_child)
        }
    }

    impl Parent {
        fn on_child(&mut self, outcome: Outcome) -> Action<Self> {
            self.resumed += 1;
            assert_eq!(self.resumed, 1);
            let v = outcome.into_value::<u32>();
            self.log.borrow_mut().push(format!("parent:resumed {:?}", v));
            Action::finish()
        }
    }

    struct Child {
        log: Log,
    }

    impl Coroutine for Child {
        fn act(&mut self) -> Action<Self> {
            self.log.borrow_mut().push("child:start".into());
            Action::start(Grandchild { log: self.log.clone(), steps: 0 }, Self::on_grandchild)
        }
    }

    impl Child {
        fn on_grandchild(&mut self, outcome: Outcome) -> Action<Self> {
            self.log.borrow_mut().push("child:resumed".into());
            match outcome.into_value::<u32>() {
                Ok(v) => Action::finish_with(v * 2),
                Err(e) => Action::error(e),
            }
        }
    }

    struct Grandchild {
        log: Log,
        steps: u32,
    }

    impl Coroutine for Grandchild {
        fn act(&mut self) -> Action<Self> {
            self.steps += 1;
            self.log.borrow_mut().push(format!("grandchild:{}", self.steps));
            if self.steps < 3 {
                Action::repeat()
            } else {
                Action::finish_with(21u32)
            }
        }
    }

    impl Drop for Grandchild {
        fn drop(&mut self) {
            self.log.borrow_mut().push("grandchild:dropped".into());
        }
    }

    #[test]
    fn test_nesting_resumes_parent_once_after_descendants() {
        let mut p = processor();
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let h = p.spawn(Parent {
            log: log.clone(),
            resumed: 0,
        });
        p.run_until_idle().unwrap();

        assert_eq!(h.try_result(), Some(Ok(())));
        assert_eq!(
            *log.borrow(),
            vec![
                "parent:start",
                "child:start",
                "grandchild:1",
                "grandchild:2",
                "grandchild:3",
                "child:resumed",
                "grandchild:dropped",
                "parent:resumed Ok(42)",
            ]
        );
    }

    #[test]
    fn test_started_child_runs_before_other_ready_work() {
        let mut p = processor();
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        p.spawn(Parent {
            log: log.clone(),
            resumed: 0,
        });
        p.spawn(Spinner {
            id: 7,
            left: 0,
            log: Rc::new(RefCell::new(Vec::new())),
        });

        p.tick().unwrap();
        p.tick().unwrap();
        assert_eq!(*log.borrow(), vec!["parent:start", "child:start"]);
        assert_eq!(p.ready_len(), 2);
    }

    struct Failing;

    impl Coroutine for Failing {
        fn act(&mut self) -> Action<Self> {
            Action::error(CoroutineError::new("bad header").with_source(std::io::Error::other("eof")))
        }
    }

    struct Catcher {
        seen: Rc<RefCell<Option<CoroutineError>>>,
    }

    impl Coroutine for Catcher {
        fn act(&mut self) -> Action<Self> {
            Action::start(Failing, Self::caught)
        }
    }

    impl Catcher {
        fn caught(&mut self, outcome: Outcome) -> Action<Self> {
            *self.seen.borrow_mut() = outcome.error().cloned();
            Action::finish()
        }
    }

    #[test]
    fn test_child_error_reaches_parent_verbatim() {
        let mut p = processor();
        let seen = Rc::new(RefCell::new(None));
        let h = p.spawn(Catcher { seen: seen.clone() });
        p.run_until_idle().unwrap();

        let err = seen.borrow().clone().unwrap();
        assert_eq!(err, CoroutineError::new("bad header"));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(h.try_result(), Some(Ok(())));
    }

    #[test]
    fn test_top_level_error_reaches_submitter() {
        let mut p = processor();
        let h = p.spawn(Failing);
        let after = p.spawn(Once);
        p.run_until_idle().unwrap();

        assert_eq!(h.try_result(), Some(Err(CoroutineError::new("bad header"))));
        assert_eq!(after.try_result(), Some(Ok(())));
        assert_eq!(p.stats().failed, 1);
        assert_eq!(p.stats().finished, 1);
    }

    struct Panicky;

    impl Coroutine for Panicky {
        fn act(&mut self) -> Action<Self> {
            panic!("step exploded");
        }
    }

    #[test]
    fn test_panic_becomes_error() {
        let mut p = processor();
        let h = p.spawn(Panicky);
        p.run_until_idle().unwrap();

        let err = h.try_result().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Panic);
        assert_eq!(err.message(), "step exploded");
    }

    #[test]
    fn test_constructor_panic_fails_handle() {
        let mut p = processor();
        let h = p
            .inbox()
            .submit(|| -> Once { panic!("no coroutine for you") })
            .unwrap();
        p.run_until_idle().unwrap();
        assert_eq!(h.try_result().unwrap().unwrap_err().kind(), ErrorKind::Panic);
    }

    struct ReadOne {
        stream: UnixStream,
        attempts: Rc<Cell<usize>>,
    }

    impl Coroutine for ReadOne {
        fn act(&mut self) -> Action<Self> {
            self.attempts.set(self.attempts.get() + 1);
            let mut buf = [0u8; 1];
            match self.stream.read(&mut buf) {
                Ok(1) => Action::finish_with(buf[0]),
                Ok(_) => Action::error(CoroutineError::new("eof")),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    Action::io_wait(self.stream.as_raw_fd(), Interest::Readable)
                }
                Err(e) => Action::error(e),
            }
        }
    }

    #[test]
    fn test_io_wait_reruns_step_once_ready() {
        let mut p = processor();
        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let attempts = Rc::new(Cell::new(0));
        let h = p.spawn(ReadOne {
            stream: a,
            attempts: attempts.clone(),
        });

        p.tick().unwrap();
        assert_eq!(attempts.get(), 1);
        assert_eq!(p.io_wait_len(), 1);

        // Not readable: ticks time out without re-running the step
        for _ in 0..3 {
            assert!(!p.tick().unwrap());
        }
        assert_eq!(attempts.get(), 1);

        b.write_all(b"z").unwrap();
        assert!(p.tick().unwrap());
        assert_eq!(attempts.get(), 2);
        assert_eq!(h.try_result(), Some(Ok(())));
    }

    struct Stubborn {
        fd: RawFd,
        steps: Rc<Cell<usize>>,
    }

    impl Coroutine for Stubborn {
        fn act(&mut self) -> Action<Self> {
            self.steps.set(self.steps.get() + 1);
            Action::io_repeat(self.fd, Interest::Readable)
        }
    }

    #[test]
    fn test_io_repeat_retries_once_then_parks() {
        let mut p = processor();
        let (a, _b) = UnixStream::pair().unwrap();
        let steps = Rc::new(Cell::new(0));
        p.spawn(Stubborn {
            fd: a.as_raw_fd(),
            steps: steps.clone(),
        });

        p.tick().unwrap();
        assert_eq!(p.ready_len(), 1);
        p.tick().unwrap();
        assert_eq!(steps.get(), 2);
        assert_eq!(p.ready_len(), 0);
        assert_eq!(p.io_wait_len(), 1);
    }

    struct Backoff {
        started: Instant,
        woke: Rc<Cell<Option<Duration>>>,
        tries: usize,
    }

    impl Coroutine for Backoff {
        fn act(&mut self) -> Action<Self> {
            self.tries += 1;
            if self.tries == 1 {
                return Action::wait_retry_after(Duration::from_millis(60));
            }
            self.woke.set(Some(self.started.elapsed()));
            Action::finish()
        }
    }

    #[test]
    fn test_wait_retry_respects_delay() {
        // Probe timeout (20ms) is shorter than the delay
        let mut p = processor();
        let woke = Rc::new(Cell::new(None));
        let h = p.spawn(Backoff {
            started: Instant::now(),
            woke: woke.clone(),
            tries: 0,
        });
        p.tick().unwrap();
        assert_eq!(p.retry_len(), 1);

        assert!(!p.tick().unwrap());
        assert_eq!(p.retry_len(), 1);
        assert_eq!(p.stats().steps, 1);
        assert_eq!(woke.get(), None);

        p.run_until_idle().unwrap();
        assert_eq!(h.try_result(), Some(Ok(())));
        assert_eq!(p.stats().steps, 2);
        assert!(woke.get().unwrap() >= Duration::from_millis(60));
    }

    struct Forever;

    impl Coroutine for Forever {
        fn act(&mut self) -> Action<Self> {
            Action::wait_retry_after(Duration::MAX)
        }
    }

    #[test]
    fn test_unbounded_retry_delay_is_clamped() {
        let mut p = processor();
        let h = p.spawn(Forever);
        let other = p.spawn(Once);

        assert!(p.tick().unwrap());
        assert_eq!(p.retry_len(), 1);
        assert!(p.tick().unwrap());
        assert_eq!(other.try_result(), Some(Ok(())));
        assert!(h.try_result().is_none());

        p.shutdown();
        assert!(h.try_result().unwrap().unwrap_err().is_cancelled());
    }

    struct Grenade;

    impl Coroutine for Grenade {
        fn act(&mut self) -> Action<Self> {
            Action::finish_with(1u32)
        }
    }

    impl Drop for Grenade {
        fn drop(&mut self) {
            panic!("drop exploded");
        }
    }

    struct Thrower {
        got: Rc<Cell<Option<u32>>>,
    }

    impl Coroutine for Thrower {
        fn act(&mut self) -> Action<Self> {
            Action::start(Grenade, Self::landed)
        }
    }

    impl Thrower {
        fn landed(&mut self, outcome: Outcome) -> Action<Self> {
            self.got.set(outcome.into_value::<u32>().ok());
            Action::finish()
        }
    }

    #[test]
    fn test_panicking_drop_does_not_escape() {
        let mut p = processor();
        let got = Rc::new(Cell::new(None));
        let nested = p.spawn(Thrower { got: got.clone() });
        let root = p.spawn(Grenade);
        p.run_until_idle().unwrap();

        assert_eq!(got.get(), Some(1));
        assert_eq!(nested.try_result(), Some(Ok(())));
        assert_eq!(root.try_result(), Some(Ok(())));

        let parked = p.spawn(Grenade);
        p.shutdown();
        assert_eq!(parked.try_result(), Some(Ok(())));
    }

    #[test]
    fn test_stopped_inbox_cancels_without_constructing() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let mut p = processor();
        let built = Arc::new(AtomicBool::new(false));
        let flag = built.clone();
        let h = p
            .inbox()
            .submit(move || {
                flag.store(true, Ordering::SeqCst);
                Once
            })
            .unwrap();

        p.inbox().stop();
        assert!(!p.tick().unwrap());
        assert!(p.is_idle());
        p.shutdown();

        assert!(!built.load(Ordering::SeqCst));
        assert!(h.try_result().unwrap().unwrap_err().is_cancelled());
        assert_eq!(p.stats().cancelled, 1);
    }

    struct Watcher {
        label: &'static str,
        fd: RawFd,
        log: Log,
    }

    impl Coroutine for Watcher {
        fn act(&mut self) -> Action<Self> {
            self.log.borrow_mut().push(format!("{}:step", self.label));
            Action::io_wait(self.fd, Interest::Readable)
        }

        fn on_cancel(&mut self) {
            self.log.borrow_mut().push(format!("{}:cancelled", self.label));
        }
    }

    #[test]
    fn test_shutdown_runs_in_flight_and_cancels_parked() {
        let mut p = processor();
        let (a, _b) = UnixStream::pair().unwrap();
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let watcher = |label| Watcher {
            label,
            fd: a.as_raw_fd(),
            log: log.clone(),
        };

        let parked = p.spawn(watcher("parked"));
        p.tick().unwrap();
        assert_eq!(p.io_wait_len(), 1);

        let in_flight = p.spawn(watcher("in_flight"));
        let pending = p.inbox().submit(|| Once).unwrap();
        p.shutdown();

        assert_eq!(
            *log.borrow(),
            vec![
                "parked:step",
                "in_flight:step",
                "in_flight:cancelled",
                "parked:cancelled",
            ]
        );
        assert!(parked.try_result().unwrap().unwrap_err().is_cancelled());
        assert!(in_flight.try_result().unwrap().unwrap_err().is_cancelled());
        assert!(pending.try_result().unwrap().unwrap_err().is_cancelled());
        assert_eq!(p.stats().cancelled, 3);
        assert!(p.is_idle());
    }

    #[test]
    fn test_shutdown_lets_in_flight_finish() {
        let mut p = processor();
        let h = p.spawn(Once);
        p.shutdown();
        assert_eq!(h.try_result(), Some(Ok(())));
        assert!(p.inbox().submit(|| Once).is_err());
        assert!(p.spawn(Once).try_result().unwrap().is_err());
    }

    #[test]
    fn test_drop_cancels_leftovers() {
        let mut p = processor();
        let h = p.spawn(Once);
        drop(p);
        assert!(h.wait().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_foreign_submit_wakes_probe() {
        let config = ExecutorConfig::new().probe_timeout(Duration::from_secs(30));
        let mut p = Processor::standalone(&config).unwrap();
        let inbox = p.inbox().clone();

        let submitter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            inbox.submit(|| Once).unwrap()
        });

        let started = Instant::now();
        // First tick blocks in the probe until the submission rings the wake fd
        p.tick().unwrap();
        let h = submitter.join().unwrap();
        if !h.is_done() {
            p.tick().unwrap();
        }
        assert_eq!(h.try_result(), Some(Ok(())));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_run_exits_on_stop() {
        let config = ExecutorConfig::new().probe_timeout(Duration::from_secs(30));
        let inbox = Arc::new(SubmissionQueue::new(4).unwrap());
        let stopper = inbox.clone();

        let worker = std::thread::spawn(move || {
            let mut p = Processor::new(4, inbox, &config);
            p.run().map(|_| p.stats())
        });
        let h = stopper.submit(|| Once).unwrap();
        assert_eq!(h.wait(), Ok(()));
        assert_eq!(h.processor(), 4);

        stopper.stop();
        let stats = worker.join().unwrap().unwrap();
        assert_eq!(stats.finished, 1);
    }
}
