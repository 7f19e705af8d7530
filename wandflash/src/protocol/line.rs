//! Deadline-bounded line matching on the device's text output.

use crate::error::Result;
use crate::port::ByteChannel;
use log::trace;
use regex::Regex;
use std::time::{Duration, Instant};

/// Longest line kept; longer runs without `\n` are discarded.
pub const MAX_LINE_LEN: usize = 256;

/// Reads lines until one matches a pattern or the deadline passes.
///
/// Each wait is independent: a partial line left over when a deadline
/// expires is dropped rather than glued to the next wait's input.
#[derive(Debug, Default)]
pub struct LineWatcher {
    pending: Vec<u8>,
}

impl LineWatcher {
    /// Create a watcher with an empty line buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for a line matching `pattern`.
    ///
    /// Returns the matching line (terminator stripped, `\r` kept), or `None`
    /// once the deadline passes. The deadline is checked after every byte
    /// and every read timeout, so the wait can overrun by at most one
    /// port read timeout even on a link that never sends `\n`. Only a hard
    /// channel fault is an error.
    pub fn wait_for<P: ByteChannel + ?Sized>(
        &mut self,
        port: &mut P,
        pattern: &Regex,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        self.pending.clear();

        loop {
            match port.read_byte()? {
                Some(b'\n') => {
                    let line = String::from_utf8_lossy(&self.pending).into_owned();
                    self.pending.clear();

                    if pattern.is_match(&line) {
                        trace!("Matched line {line:?}");
                        return Ok(Some(line));
                    }
                    trace!("Skipping line {line:?}");
                },
                Some(byte) => {
                    if self.pending.len() >= MAX_LINE_LEN {
                        trace!("Discarding {} bytes without line end", self.pending.len());
                        self.pending.clear();
                    }
                    self.pending.push(byte);
                },
                None => {},
            }

            if Instant::now() >= deadline {
                self.pending.clear();
                return Ok(None);
            }
        }
    }
}
