//! Self-pipe wake signal for unix targets without eventfd

use nix::fcntl::{fcntl, FcntlArg, OFlag};

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};

pub(crate) struct WakePipe {
    reader: File,
    writer: File,
}

impl WakePipe {
    pub(crate) fn create() -> io::Result<Self> {
        let (reader, writer) = nix::unistd::pipe()?;
        for fd in [reader.as_raw_fd(), writer.as_raw_fd()] {
            fcntl(fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK))?;
            fcntl(fd, FcntlArg::F_SETFD(nix::fcntl::FdFlag::FD_CLOEXEC))?;
        }
        Ok(Self {
            reader: File::from(reader),
            writer: File::from(writer),
        })
    }

    pub(crate) fn notify(&self) -> io::Result<()> {
        match (&self.writer).write(&[1u8]) {
            Ok(_) => Ok(()),
            // Pipe full: plenty of wakeups are pending already
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn drain(&self) -> io::Result<()> {
        let mut buf = [0u8; 64];
        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    #[inline]
    pub(crate) fn fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }
}
