//! Streaming the board's text output to the host.

use crate::CancelToken;
use crate::error::{Error, Result};
use crate::port::ByteChannel;
use log::debug;
use std::io::Write;

/// Bytes requested per read while streaming.
const READ_CHUNK: usize = 256;

/// Drain buffered bytes into displayable UTF-8 text without stalling on invalid bytes.
///
/// - Valid UTF-8 is emitted as-is.
/// - Invalid byte sequences emit the replacement char `�` and continue.
/// - Incomplete UTF-8 suffix is kept in `buffer` for the next read.
pub fn drain_utf8_lossy(buffer: &mut Vec<u8>) -> String {
    let mut output = String::new();

    loop {
        match std::str::from_utf8(buffer) {
            Ok(valid) => {
                output.push_str(valid);
                buffer.clear();
                return output;
            },
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                output.push_str(&String::from_utf8_lossy(&buffer[..valid_up_to]));

                let Some(invalid_len) = err.error_len() else {
                    buffer.drain(..valid_up_to);
                    return output;
                };
                output.push(char::REPLACEMENT_CHARACTER);
                buffer.drain(..(valid_up_to + invalid_len).min(buffer.len()));
            },
        }
    }
}

/// Copy device output to `out` until `cancel` is tripped.
///
/// The token is checked between reads, so shutdown latency is bounded by
/// the port read timeout. A multi-byte character split across reads is held
/// back until it is complete; whatever is still pending at shutdown is
/// written lossily. Returns the number of bytes read from the device.
pub fn pipe_output<P, W>(port: &mut P, out: &mut W, cancel: &CancelToken) -> Result<u64>
where
    P: ByteChannel + ?Sized,
    W: Write + ?Sized,
{
    let mut pending = Vec::new();
    let mut total = 0u64;

    while !cancel.is_cancelled() {
        let chunk = port.read_up_to(READ_CHUNK)?;
        if chunk.is_empty() {
            continue;
        }
        total += chunk.len() as u64;
        pending.extend_from_slice(&chunk);

        let text = drain_utf8_lossy(&mut pending);
        if !text.is_empty() {
            out.write_all(text.as_bytes()).map_err(Error::Output)?;
            out.flush().map_err(Error::Output)?;
        }
    }

    if !pending.is_empty() {
        out.write_all(String::from_utf8_lossy(&pending).as_bytes())
            .map_err(Error::Output)?;
        out.flush().map_err(Error::Output)?;
    }

    debug!("Output streaming stopped after {total} bytes");
    Ok(total)
}
