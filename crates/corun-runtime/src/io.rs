//! Non-blocking transfer coroutines
//!
//! Building blocks for protocol pipelines: push a buffer into, or pull an
//! exact number of bytes out of, a non-blocking stream without ever
//! blocking the processor.
//!
//! The stream is shared through an `Rc` so a parent coroutine can keep
//! using it after the child finishes. Any `S` with `&S: Read/Write` works
//! (`UnixStream`, `TcpStream`, ...); it must already be in non-blocking
//! mode.
//!
//! | I/O result            | Action                         |
//! |-----------------------|--------------------------------|
//! | partial progress      | `IoRepeat` (retry once at once) |
//! | `WouldBlock`          | `IoWait`                       |
//! | `Interrupted`         | `Repeat`                       |
//! | done                  | `Finish` with the result       |
//! | other error, EOF, 0-byte write | `Error`               |

use corun_core::{Action, Coroutine, CoroutineError, Interest};

use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::rc::Rc;

/// Write a whole buffer. Finishes with the number of bytes written (`usize`).
pub struct WriteAll<S> {
    stream: Rc<S>,
    buf: Vec<u8>,
    written: usize,
}

impl<S> WriteAll<S> {
    pub fn new(stream: Rc<S>, buf: impl Into<Vec<u8>>) -> Self {
        Self {
            stream,
            buf: buf.into(),
            written: 0,
        }
    }

    /// Bytes written so far
    #[inline]
    pub fn written(&self) -> usize {
        self.written
    }
}

impl<S> Coroutine for WriteAll<S>
where
    S: AsRawFd + 'static,
    for<'a> &'a S: Write,
{
    fn act(&mut self) -> Action<Self> {
        if self.written == self.buf.len() {
            return Action::finish_with(self.written);
        }
        let fd = self.stream.as_raw_fd();
        match (&*self.stream).write(&self.buf[self.written..]) {
            Ok(0) => Action::error(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                self.written += n;
                if self.written == self.buf.len() {
                    Action::finish_with(self.written)
                } else {
                    Action::io_repeat(fd, Interest::Writable)
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Action::io_wait(fd, Interest::Writable),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Action::repeat(),
            Err(e) => Action::error(e),
        }
    }

    fn name(&self) -> &'static str {
        "WriteAll"
    }
}

/// Read exactly `len` bytes. Finishes with the bytes (`Vec<u8>`).
pub struct ReadExact<S> {
    stream: Rc<S>,
    buf: Vec<u8>,
    filled: usize,
}

impl<S> ReadExact<S> {
    pub fn new(stream: Rc<S>, len: usize) -> Self {
        Self {
            stream,
            buf: vec![0; len],
            filled: 0,
        }
    }

    /// Bytes received so far
    #[inline]
    pub fn filled(&self) -> usize {
        self.filled
    }
}

impl<S> Coroutine for ReadExact<S>
where
    S: AsRawFd + 'static,
    for<'a> &'a S: Read,
{
    fn act(&mut self) -> Action<Self> {
        if self.filled == self.buf.len() {
            return Action::finish_with(std::mem::take(&mut self.buf));
        }
        let fd = self.stream.as_raw_fd();
        match (&*self.stream).read(&mut self.buf[self.filled..]) {
            Ok(0) => Action::error(CoroutineError::io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream closed after {} of {} bytes", self.filled, self.buf.len()),
            ))),
            Ok(n) => {
                self.filled += n;
                if self.filled == self.buf.len() {
                    Action::finish_with(std::mem::take(&mut self.buf))
                } else {
                    Action::io_repeat(fd, Interest::Readable)
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Action::io_wait(fd, Interest::Readable),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Action::repeat(),
            Err(e) => Action::error(e),
        }
    }

    fn name(&self) -> &'static str {
        "ReadExact"
    }
}
