//! Error types for the coroutine engine
//!
//! Two families live here:
//!
//! - [`CoroutineError`] is the payload of an `ERROR` action. The engine never
//!   looks inside it; it only routes it to the parent continuation or to the
//!   submitter's task handle.
//! - [`ExecError`] covers failures of the engine itself (configuration,
//!   shutdown, thread and descriptor setup).

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Result type for engine operations
pub type ExecResult<T> = Result<T, ExecError>;

/// Broad category of a coroutine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A non-blocking read/write failed
    Io,

    /// The step panicked; the panic message is the error message
    Panic,

    /// The task was dropped by processor shutdown before completing
    Cancelled,

    /// Failure raised by the coroutine's own logic
    Failed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Io => write!(f, "io"),
            ErrorKind::Panic => write!(f, "panic"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Failed => write!(f, "failed"),
        }
    }
}

/// Error payload carried by an `ERROR` action.
///
/// Cheap to clone so the same value can reach a parent continuation and,
/// from a top-level task, every clone of the submitter's handle.
#[derive(Clone)]
pub struct CoroutineError {
    kind: ErrorKind,
    message: String,
    errno: Option<i32>,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl CoroutineError {
    /// Failure raised by coroutine logic
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Failed, message)
    }

    /// Error of an explicit kind
    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            errno: None,
            source: None,
        }
    }

    /// Wrap an I/O error, keeping its errno if it has one
    pub fn io(err: io::Error) -> Self {
        Self {
            kind: ErrorKind::Io,
            message: err.to_string(),
            errno: err.raw_os_error(),
            source: Some(Arc::new(err)),
        }
    }

    /// Step fault converted from a panic payload
    pub fn panic(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Panic, message)
    }

    /// Task dropped at shutdown
    pub fn cancelled() -> Self {
        Self::with_kind(ErrorKind::Cancelled, "task cancelled by processor shutdown")
    }

    /// Attach an underlying cause
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// OS error number for `ErrorKind::Io` errors built from an OS error
    #[inline]
    pub fn errno(&self) -> Option<i32> {
        self.errno
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl PartialEq for CoroutineError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message && self.errno == other.errno
    }
}

impl Eq for CoroutineError {}

impl fmt::Debug for CoroutineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("CoroutineError");
        s.field("kind", &self.kind).field("message", &self.message);
        if let Some(errno) = self.errno {
            s.field("errno", &errno);
        }
        s.finish()
    }
}

impl fmt::Display for CoroutineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for CoroutineError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

impl From<io::Error> for CoroutineError {
    fn from(err: io::Error) -> Self {
        CoroutineError::io(err)
    }
}

/// Errors raised by the engine itself
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Configuration rejected by `validate()`
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    /// Submission after `stop()`
    #[error("executor is shut down")]
    Shutdown,

    /// `submit_to` with an out-of-range processor index
    #[error("no processor with index {index} (executor has {count})")]
    InvalidProcessor { index: usize, count: usize },

    /// Wake descriptor could not be created
    #[error("wake signal setup failed: {0}")]
    WakeSetup(#[source] io::Error),

    /// Readiness probe syscall failed
    #[error("readiness probe failed: {0}")]
    Probe(#[source] io::Error),

    /// Worker thread could not be spawned
    #[error("failed to spawn processor thread {index}: {source}")]
    SpawnFailed {
        index: usize,
        #[source]
        source: io::Error,
    },

    /// One or more worker threads panicked
    #[error("{count} processor thread(s) panicked")]
    WorkerPanicked { count: usize },

    /// CPU affinity could not be applied
    #[error("failed to pin processor {index} to cpu {cpu}: errno {errno}")]
    Affinity { index: usize, cpu: usize, errno: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = CoroutineError::new("bad header");
        assert_eq!(format!("{}", e), "failed: bad header");

        let e = ExecError::InvalidConfig("num_processors must be > 0");
        assert_eq!(format!("{}", e), "invalid config: num_processors must be > 0");

        let e = ExecError::InvalidProcessor { index: 4, count: 2 };
        assert_eq!(format!("{}", e), "no processor with index 4 (executor has 2)");
    }

    #[test]
    fn test_io_conversion_keeps_errno() {
        let io_err = io::Error::from_raw_os_error(libc_epipe());
        let e: CoroutineError = io_err.into();
        assert_eq!(e.kind(), ErrorKind::Io);
        assert_eq!(e.errno(), Some(libc_epipe()));
        assert!(e.source().is_some());
    }

    #[test]
    fn test_clone_compares_equal() {
        let e = CoroutineError::new("boom").with_source(io::Error::other("inner"));
        let c = e.clone();
        assert_eq!(e, c);
        assert_ne!(e, CoroutineError::panic("boom"));
    }

    #[test]
    fn test_cancelled() {
        let e = CoroutineError::cancelled();
        assert!(e.is_cancelled());
        assert_eq!(e.kind(), ErrorKind::Cancelled);
    }

    fn libc_epipe() -> i32 {
        32
    }
}
