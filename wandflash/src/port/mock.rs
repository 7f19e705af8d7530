//! Scripted in-memory port for protocol tests.
//!
//! Reads are served from a queue filled up front; an empty queue behaves
//! like a serial timeout. Writes are captured for inspection.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::port::Port;

pub(crate) struct MockSerial {
    read_buf: VecDeque<u8>,
    write_buf: Vec<u8>,
    triggers: Vec<(u8, Vec<u8>)>,
    broken: bool,
    open: bool,
    present: bool,
    opens: u32,
    timeout: Duration,
}

impl MockSerial {
    pub(crate) fn new(response: &[u8]) -> Self {
        Self {
            read_buf: response.iter().copied().collect(),
            write_buf: Vec::new(),
            triggers: Vec::new(),
            broken: false,
            open: false,
            present: true,
            opens: 0,
            timeout: Duration::from_millis(10),
        }
    }

    /// A port whose reads fail with a hard I/O error.
    pub(crate) fn broken() -> Self {
        Self {
            broken: true,
            ..Self::new(b"")
        }
    }

    /// A port whose device node does not exist.
    pub(crate) fn absent() -> Self {
        Self {
            present: false,
            ..Self::new(b"")
        }
    }

    /// Queue `reply` the first time `byte` is written.
    pub(crate) fn reply_to(mut self, byte: u8, reply: &[u8]) -> Self {
        self.triggers.push((byte, reply.to_vec()));
        self
    }

    pub(crate) fn written(&self) -> &[u8] {
        &self.write_buf
    }

    pub(crate) fn opens(&self) -> u32 {
        self.opens
    }
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        if self.read_buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.read_buf.len());
        for (slot, byte) in buf.iter_mut().zip(self.read_buf.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_buf.extend_from_slice(buf);
        for byte in buf {
            if let Some(pos) = self.triggers.iter().position(|(t, _)| t == byte) {
                let (_, reply) = self.triggers.remove(pos);
                self.read_buf.extend(reply);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockSerial {
    fn open(&mut self) -> Result<()> {
        if !self.open {
            self.open = true;
            self.opens += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn is_present(&self) -> bool {
        self.present
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_buffers(&mut self) -> Result<()> {
        Ok(())
    }
}
