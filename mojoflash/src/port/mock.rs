//! Scripted in-memory port for unit tests.
//!
//! Reads are served from a queue of bytes the "device" will send; writes and
//! control-line changes are recorded. An empty queue behaves like a serial
//! port whose per-read timeout expired.

use crate::error::Result;
use crate::port::{ControlLine, Port};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;

pub(crate) struct MockPort {
    replies: VecDeque<u8>,
    written: Vec<u8>,
    control_line: Vec<bool>,
    input_clears: usize,
    read_error: Option<ErrorKind>,
    write_limit: Option<usize>,
    max_write: Option<usize>,
    closed: bool,
}

impl MockPort {
    pub(crate) fn new(replies: &[u8]) -> Self {
        Self {
            replies: replies.iter().copied().collect(),
            written: Vec::new(),
            control_line: Vec::new(),
            input_clears: 0,
            read_error: None,
            write_limit: None,
            max_write: None,
            closed: false,
        }
    }

    /// Fail the next read with `kind`.
    pub(crate) fn with_read_error(mut self, kind: ErrorKind) -> Self {
        self.read_error = Some(kind);
        self
    }

    /// Accept only `limit` bytes in total; later writes make no progress.
    pub(crate) fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Accept at most `max` bytes per `write` call.
    pub(crate) fn with_max_write(mut self, max: usize) -> Self {
        self.max_write = Some(max);
        self
    }

    pub(crate) fn written(&self) -> &[u8] {
        &self.written
    }

    pub(crate) fn control_line(&self) -> &[bool] {
        &self.control_line
    }

    pub(crate) fn input_clears(&self) -> usize {
        self.input_clears
    }

    /// Reply bytes the engine has not consumed yet.
    pub(crate) fn pending(&self) -> usize {
        self.replies.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(ErrorKind::NotConnected, "port closed"));
        }
        if let Some(kind) = self.read_error.take() {
            return Err(io::Error::new(kind, "injected read error"));
        }
        if self.replies.is_empty() {
            return Err(io::Error::new(ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.replies.len());
        for (slot, byte) in buf.iter_mut().zip(self.replies.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(ErrorKind::NotConnected, "port closed"));
        }
        let mut n = match self.write_limit {
            Some(limit) => buf.len().min(limit.saturating_sub(self.written.len())),
            None => buf.len(),
        };
        if let Some(max) = self.max_write {
            n = n.min(max);
        }
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ControlLine for MockPort {
    fn set_control_line(&mut self, asserted: bool) -> Result<()> {
        self.control_line.push(asserted);
        Ok(())
    }
}

impl Port for MockPort {
    fn timeout(&self) -> Duration {
        Duration::from_millis(5)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.input_clears += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
