//! Port abstraction for the link to the board.
//!
//! Two layers live here:
//!
//! - [`Port`]: owns the physical link lifetime (open, close, presence,
//!   timeout). Implemented by [`NativePort`] on top of the `serialport` crate.
//! - [`ByteChannel`]: timeout-aware byte and line reads over any
//!   `Read + Write`. A read that times out yields `None` or a short buffer,
//!   never an error; only hard faults surface as [`Error::Channel`].
//!
//! ```text
//! +--------------------------+
//! |  Handshake / XMODEM      |
//! +------------+-------------+
//!              | ByteChannel (read_byte, read_up_to, send)
//! +------------v-------------+
//! |  Port (open/close)       |
//! +------------+-------------+
//!              |
//! +------------v-------------+
//! |  NativePort (serialport) |
//! +--------------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Per-call read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115200,
            timeout: Duration::from_millis(1000),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A link to the board whose lifetime is managed explicitly.
///
/// `open` and `close` are idempotent: opening an open port and closing a
/// closed one both succeed without side effects.
pub trait Port: Read + Write + Send {
    /// Open the link if it is not open yet.
    fn open(&mut self) -> Result<()>;

    /// Whether the link is currently open.
    fn is_open(&self) -> bool;

    /// Close the link and release resources.
    fn close(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Whether the device node exists. Does not open the link.
    fn is_present(&self) -> bool {
        Path::new(self.name()).exists()
    }

    /// Set the per-call read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Discard pending input and output.
    fn clear_buffers(&mut self) -> Result<()>;
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Timeout-aware reads and flushed writes over a byte stream.
///
/// Blanket-implemented for every `Read + Write`.
pub trait ByteChannel: Read + Write {
    /// Read one byte, `None` if the channel timed out.
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.read(&mut buf) {
                Ok(1) => return Ok(Some(buf[0])),
                Ok(_) => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) => return Err(Error::Channel(e)),
            }
        }
    }

    /// Read up to `n` bytes, stopping early on the first timeout.
    fn read_up_to(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) if is_timeout(&e) => break,
                Err(e) => return Err(Error::Channel(e)),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Write all bytes and flush them out immediately.
    fn send(&mut self, buf: &[u8]) -> Result<()> {
        self.write_all(buf)?;
        self.flush()?;
        Ok(())
    }

    /// Write a single byte and flush it.
    fn send_byte(&mut self, byte: u8) -> Result<()> {
        self.send(&[byte])
    }
}

impl<T: Read + Write + ?Sized> ByteChannel for T {}

#[cfg(feature = "native")]
pub use native::NativePort;
