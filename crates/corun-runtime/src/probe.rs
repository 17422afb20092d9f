//! Readiness probe
//!
//! The only place a processor may block. One call checks the wake
//! descriptor plus every parked (fd, interest) pair, waiting at most
//! `timeout`.

use corun_core::{ExecError, ExecResult, Interest};

use nix::errno::Errno;
use std::os::fd::RawFd;
use std::time::Duration;

/// Non-blocking readiness check over a set of (descriptor, interest) pairs
pub trait ReadinessProbe {
    /// Wait up to `timeout` for `wake_fd` or any interest to become ready.
    ///
    /// Indices into `interests` that are ready are appended to `ready`.
    /// Returns whether the wake descriptor fired. An interrupted wait
    /// reports nothing ready.
    fn probe(
        &mut self,
        wake_fd: RawFd,
        interests: &[(RawFd, Interest)],
        timeout: Duration,
        ready: &mut Vec<usize>,
    ) -> ExecResult<bool>;
}

/// `poll(2)` based probe
///
/// Error conditions (`POLLERR`, `POLLHUP`, `POLLNVAL`) count as ready: the
/// woken step sees the failure on its next read or write.
#[derive(Debug, Default)]
pub struct PollProbe {
    fds: Vec<libc::pollfd>,
}

impl PollProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

fn events_for(interest: Interest) -> libc::c_short {
    match interest {
        Interest::Readable => libc::POLLIN,
        Interest::Writable => libc::POLLOUT,
    }
}

/// Round up so a 100us deadline does not turn into a busy 0ms poll
fn timeout_ms(timeout: Duration) -> libc::c_int {
    if timeout.is_zero() {
        return 0;
    }
    let ms = timeout.as_micros().div_ceil(1000);
    ms.min(libc::c_int::MAX as u128) as libc::c_int
}

impl ReadinessProbe for PollProbe {
    fn probe(
        &mut self,
        wake_fd: RawFd,
        interests: &[(RawFd, Interest)],
        timeout: Duration,
        ready: &mut Vec<usize>,
    ) -> ExecResult<bool> {
        self.fds.clear();
        self.fds.push(libc::pollfd {
            fd: wake_fd,
            events: libc::POLLIN,
            revents: 0,
        });
        self.fds.extend(interests.iter().map(|&(fd, interest)| libc::pollfd {
            fd,
            events: events_for(interest),
            revents: 0,
        }));

        // SAFETY: `fds` is an initialized pollfd array of the length passed
        let n = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms(timeout),
            )
        };
        if n < 0 {
            let errno = Errno::last();
            if errno == Errno::EINTR {
                return Ok(false);
            }
            return Err(ExecError::Probe(errno.into()));
        }
        if n == 0 {
            return Ok(false);
        }

        let mask = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;
        for (i, pfd) in self.fds[1..].iter().enumerate() {
            if pfd.revents & (pfd.events | mask) != 0 {
                ready.push(i);
            }
        }
        Ok(self.fds[0].revents != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wake::WakeSignal;
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_timeout_rounding() {
        assert_eq!(timeout_ms(Duration::ZERO), 0);
        assert_eq!(timeout_ms(Duration::from_micros(100)), 1);
        assert_eq!(timeout_ms(Duration::from_millis(50)), 50);
        assert_eq!(timeout_ms(Duration::from_secs(u64::MAX)), libc::c_int::MAX);
    }

    #[test]
    fn test_nothing_ready_times_out() {
        let wake = WakeSignal::new().unwrap();
        let (a, _b) = UnixStream::pair().unwrap();
        let mut probe = PollProbe::new();
        let mut ready = Vec::new();
        let woke = probe
            .probe(
                wake.fd(),
                &[(a.as_raw_fd(), Interest::Readable)],
                Duration::from_millis(1),
                &mut ready,
            )
            .unwrap();
        assert!(!woke);
        assert!(ready.is_empty());
    }

    #[test]
    fn test_reports_ready_indices() {
        let wake = WakeSignal::new().unwrap();
        let (a, mut b) = UnixStream::pair().unwrap();
        let (c, _d) = UnixStream::pair().unwrap();
        b.write_all(b"x").unwrap();

        let interests = [
            (c.as_raw_fd(), Interest::Readable),
            (a.as_raw_fd(), Interest::Readable),
            (c.as_raw_fd(), Interest::Writable),
        ];
        let mut probe = PollProbe::new();
        let mut ready = Vec::new();
        probe
            .probe(wake.fd(), &interests, Duration::from_millis(10), &mut ready)
            .unwrap();
        assert_eq!(ready, vec![1, 2]);
    }

    #[test]
    fn test_wake_fd_fires() {
        let wake = WakeSignal::new().unwrap();
        wake.notify().unwrap();
        let mut probe = PollProbe::new();
        let mut ready = Vec::new();
        let woke = probe
            .probe(wake.fd(), &[], Duration::from_secs(5), &mut ready)
            .unwrap();
        assert!(woke);
    }

    #[test]
    fn test_hangup_counts_as_ready() {
        let wake = WakeSignal::new().unwrap();
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        let mut probe = PollProbe::new();
        let mut ready = Vec::new();
        probe
            .probe(
                wake.fd(),
                &[(a.as_raw_fd(), Interest::Readable)],
                Duration::from_millis(10),
                &mut ready,
            )
            .unwrap();
        assert_eq!(ready, vec![0]);
    }
}
