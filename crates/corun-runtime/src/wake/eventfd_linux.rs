//! eventfd-backed wake signal (Linux)
//!
//! Counter semantics: every `notify()` adds one, a single 8-byte read in
//! `drain()` resets the counter to zero.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

pub(crate) struct EventFd {
    fd: OwnedFd,
}

impl EventFd {
    pub(crate) fn create() -> io::Result<Self> {
        // SAFETY: eventfd takes no pointers; a negative return is checked below
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: eventfd returned a fresh descriptor that nothing else owns
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }

    pub(crate) fn notify(&self) -> io::Result<()> {
        let val: u64 = 1;
        // SAFETY: `val` is a live 8-byte buffer and the descriptor is owned by `self`
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            // EAGAIN: the counter would overflow, so a wakeup is already pending
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    pub(crate) fn drain(&self) -> io::Result<()> {
        let mut val: u64 = 0;
        // SAFETY: `val` is a writable 8-byte buffer and the descriptor is owned by `self`
        let ret = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
