//! Pollable wake signal
//!
//! A processor blocks only inside its readiness probe. Foreign threads that
//! submit work (or stop the processor) must be able to cut that wait short,
//! so every probe also watches the descriptor of a [`WakeSignal`].
//!
//! **Contract:**
//! - `notify()` never blocks.
//! - Several `notify()` calls before the processor drains are coalesced
//!   into one wakeup.
//! - `drain()` is only called from the processor thread.
//!
//! # Implementations
//!
//! - Linux: `eventfd(EFD_NONBLOCK | EFD_CLOEXEC)`, counter semantics.
//! - Other unix: a non-blocking pipe; `drain()` reads until empty.

use std::io;
use std::os::fd::RawFd;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod eventfd_linux;
        use eventfd_linux::EventFd as Inner;
    } else if #[cfg(unix)] {
        mod pipe;
        use pipe::WakePipe as Inner;
    } else {
        compile_error!("Unsupported platform");
    }
}

/// Coalescing, pollable wake descriptor
pub struct WakeSignal {
    inner: Inner,
}

impl WakeSignal {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            inner: Inner::create()?,
        })
    }

    /// Wake whoever polls [`fd()`](Self::fd). Safe from any thread.
    #[inline]
    pub fn notify(&self) -> io::Result<()> {
        self.inner.notify()
    }

    /// Reset the signal after a wakeup
    #[inline]
    pub fn drain(&self) -> io::Result<()> {
        self.inner.drain()
    }

    /// Descriptor to include in readiness probes (readable while signalled)
    #[inline]
    pub fn fd(&self) -> RawFd {
        self.inner.fd()
    }
}

impl std::fmt::Debug for WakeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeSignal").field("fd", &self.fd()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readable(fd: RawFd) -> bool {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let n = unsafe { libc::poll(&mut pfd, 1, 0) };
        n == 1 && (pfd.revents & libc::POLLIN) != 0
    }

    #[test]
    fn test_notify_makes_fd_readable() {
        let wake = WakeSignal::new().unwrap();
        assert!(!readable(wake.fd()));
        wake.notify().unwrap();
        assert!(readable(wake.fd()));
        wake.drain().unwrap();
        assert!(!readable(wake.fd()));
    }

    #[test]
    fn test_notifications_coalesce() {
        let wake = WakeSignal::new().unwrap();
        for _ in 0..100 {
            wake.notify().unwrap();
        }
        wake.drain().unwrap();
        assert!(!readable(wake.fd()));
    }

    #[test]
    fn test_drain_without_notify_is_ok() {
        let wake = WakeSignal::new().unwrap();
        wake.drain().unwrap();
        wake.drain().unwrap();
    }

    #[test]
    fn test_notify_from_other_thread() {
        let wake = std::sync::Arc::new(WakeSignal::new().unwrap());
        let w = wake.clone();
        std::thread::spawn(move || w.notify().unwrap())
            .join()
            .unwrap();
        assert!(readable(wake.fd()));
    }
}
