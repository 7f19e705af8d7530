//! XMODEM-CRC transmitter.
//!
//! The bootloader receives images over plain 128-byte XMODEM with CRC16
//! error detection. Only the sending side is implemented.
//!
//! ## Packet format
//!
//! ```text
//! +-----+-----+------+---------------+--------+--------+
//! | SOH | SEQ | ~SEQ |   DATA (128)  | CRC-hi | CRC-lo |
//! +-----+-----+------+---------------+--------+--------+
//! | 1   | 1   | 1    |      128      | 1      | 1      |
//! +-----+-----+------+---------------+--------+--------+
//! ```
//!
//! The transfer is stop-and-wait: every frame is followed by a blocking read
//! of the single reply byte, so there is never more than one packet in
//! flight.

use crate::error::{Error, Result};
use crate::port::ByteChannel;
use crate::protocol::crc::crc16_xmodem;
use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace, warn};
use std::io::{self, BufRead, Read, Write};

/// XMODEM control characters.
pub mod control {
    /// Start of Header (128-byte block).
    pub const SOH: u8 = 0x01;
    /// End of Transmission.
    pub const EOT: u8 = 0x04;
    /// Acknowledge.
    pub const ACK: u8 = 0x06;
    /// Not Acknowledge.
    pub const NAK: u8 = 0x15;
    /// Cancel.
    pub const CAN: u8 = 0x18;
    /// CRC mode request character ("new CRC generation").
    pub const NCG: u8 = b'C';
}

/// Payload bytes per packet.
pub const DATA_SIZE: usize = 128;

/// Total frame size on the wire.
pub const PACKET_SIZE: usize = 3 + DATA_SIZE + 2;

/// Fill byte for the unused tail of the last packet.
pub const PAD_BYTE: u8 = 0xFF;

/// Attempts per block; also bounds the wait for the receiver's 'C'.
pub const MAX_RETRANSMISSION: u32 = 5;

/// Number of packets needed for an image of `len` bytes.
///
/// An empty image still takes one (fully padded) packet.
pub fn packet_count(len: u64) -> u32 {
    let packets = len.div_ceil(DATA_SIZE as u64).max(1);
    u32::try_from(packets).unwrap_or(u32::MAX)
}

/// One XMODEM block.
///
/// The checksum is derived from the payload and must be recomputed after
/// every payload change; [`XmodemPacket::frame`] refuses a stale packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmodemPacket {
    block: u8,
    payload: [u8; DATA_SIZE],
    crc: Option<u16>,
}

impl Default for XmodemPacket {
    fn default() -> Self {
        Self::with_block(1)
    }
}

impl XmodemPacket {
    /// An empty packet carrying the given block number.
    pub fn with_block(block: u8) -> Self {
        Self {
            block,
            payload: [0u8; DATA_SIZE],
            crc: None,
        }
    }

    /// The empty successor packet (block number + 1, wrapping).
    #[must_use]
    pub fn next(&self) -> Self {
        Self::with_block(self.block.wrapping_add(1))
    }

    /// Block number.
    pub fn block_number(&self) -> u8 {
        self.block
    }

    /// Bitwise complement of the block number.
    pub fn block_complement(&self) -> u8 {
        !self.block
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8; DATA_SIZE] {
        &self.payload
    }

    /// Checksum, if computed since the last payload write.
    pub fn checksum(&self) -> Option<u16> {
        self.crc
    }

    /// Fill the payload from `source`.
    ///
    /// Reads until the payload is full or the source reports end of data;
    /// only in the latter case is the remainder padded. A read fault before
    /// that point is a [`Error::FileRead`]. Returns the number of bytes taken
    /// from `source`. Invalidates the checksum.
    pub fn fill_from<R: Read + ?Sized>(&mut self, source: &mut R) -> Result<usize> {
        self.crc = None;
        let mut filled = 0;
        while filled < DATA_SIZE {
            match source.read(&mut self.payload[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::FileRead(e)),
            }
        }
        if filled < DATA_SIZE {
            trace!(
                "Block {}: padding {} bytes after end of image",
                self.block,
                DATA_SIZE - filled
            );
            self.payload[filled..].fill(PAD_BYTE);
        }
        Ok(filled)
    }

    /// Compute and store the CRC of the current payload.
    pub fn compute_checksum(&mut self) -> u16 {
        let crc = crc16_xmodem(&self.payload);
        self.crc = Some(crc);
        crc
    }

    /// Serialize the packet into its 133-byte wire frame.
    pub fn frame(&self) -> Result<[u8; PACKET_SIZE]> {
        let crc = self
            .crc
            .ok_or(Error::IllegalState("packet framed without a current checksum"))?;

        let mut frame = [0u8; PACKET_SIZE];
        frame[0] = control::SOH;
        frame[1] = self.block;
        frame[2] = !self.block;
        frame[3..3 + DATA_SIZE].copy_from_slice(&self.payload);
        BigEndian::write_u16(&mut frame[3 + DATA_SIZE..], crc);
        Ok(frame)
    }
}

/// XMODEM sender configuration.
#[derive(Debug, Clone)]
pub struct XmodemConfig {
    /// Attempts per block and reads while waiting for 'C'. EOT gets twice
    /// as many.
    pub max_retransmission: u32,
}

impl Default for XmodemConfig {
    fn default() -> Self {
        Self {
            max_retransmission: MAX_RETRANSMISSION,
        }
    }
}

/// Bookkeeping for the transfer in progress.
struct TransferState {
    current: XmodemPacket,
    retry_count: u32,
    packets_sent: u32,
}

/// XMODEM transfer handler.
pub struct XmodemSender<'a, P: Read + Write> {
    port: &'a mut P,
    config: XmodemConfig,
}

impl<'a, P: Read + Write> XmodemSender<'a, P> {
    /// Create a sender with the default retransmission policy.
    pub fn new(port: &'a mut P) -> Self {
        Self {
            port,
            config: XmodemConfig::default(),
        }
    }

    /// Create a sender with custom configuration.
    pub fn with_config(port: &'a mut P, config: XmodemConfig) -> Self {
        Self { port, config }
    }

    /// Wait for the receiver to request a CRC-mode transfer.
    pub fn wait_for_ncg(&mut self) -> Result<()> {
        debug!("Waiting for 'C' from receiver...");

        for attempt in 1..=self.config.max_retransmission {
            match self.port.read_byte()? {
                Some(control::NCG) => {
                    debug!("Received 'C', starting transfer in CRC mode");
                    return Ok(());
                },
                Some(c) => trace!("Received 0x{c:02X} while waiting for 'C' (attempt {attempt})"),
                None => trace!("No reply while waiting for 'C' (attempt {attempt})"),
            }
        }

        Err(Error::ProtocolRejected)
    }

    /// Send three CAN bytes to abort the receiver.
    fn abort(&mut self) {
        if let Err(e) = self.port.send(&[control::CAN; 3]) {
            warn!("Failed to send cancel sequence: {e}");
        }
    }

    /// Transmit the current block until it is acknowledged.
    fn send_block(&mut self, state: &mut TransferState) -> Result<()> {
        let frame = state.current.frame()?;
        let block = state.current.block_number();
        state.retry_count = 0;

        while state.retry_count < self.config.max_retransmission {
            state.retry_count += 1;
            trace!("Sending block {block} (attempt {})", state.retry_count);

            self.port.send(&frame)?;

            match self.port.read_byte()? {
                Some(control::ACK) => {
                    trace!("Block {block} ACKed");
                    return Ok(());
                },
                Some(control::CAN) => {
                    if self.port.read_byte()? == Some(control::CAN) {
                        // Drain the trailing byte of the cancel burst, then
                        // acknowledge the cancellation.
                        let _ = self.port.read_byte()?;
                        self.port.send_byte(control::ACK)?;
                        return Err(Error::CancelledByTarget);
                    }
                    debug!("Single CAN after block {block}, treating as noise");
                },
                Some(control::NAK) => debug!("Block {block} NAKed, retrying..."),
                Some(c) => debug!("Unexpected response 0x{c:02X} to block {block}, retrying..."),
                None => debug!("Timeout waiting for ACK of block {block}, retrying..."),
            }
        }

        self.abort();
        Err(Error::TooManyRetries {
            block,
            attempts: state.retry_count,
        })
    }

    /// Send EOT until the receiver acknowledges it.
    fn send_eot(&mut self, packets: u32) -> Result<()> {
        debug!("Sending EOT");

        for _ in 0..2 * self.config.max_retransmission {
            self.port.send_byte(control::EOT)?;
            if self.port.read_byte()? == Some(control::ACK) {
                debug!("EOT ACKed");
                return Ok(());
            }
        }

        Err(Error::EotNotAcknowledged { packets })
    }

    /// Transfer an in-memory image.
    pub fn send_image(&mut self, image: &[u8]) -> Result<u32> {
        self.send(image, packet_count(image.len() as u64), |_, _| {})
    }

    /// Transfer the whole of `source`.
    ///
    /// # Arguments
    ///
    /// * `source` - Image data
    /// * `total_packets` - Expected packet count, passed through to `progress`
    /// * `progress` - Called after every acknowledged block (sent, total)
    ///
    /// Returns the number of data packets sent.
    pub fn send<R, F>(&mut self, mut source: R, total_packets: u32, mut progress: F) -> Result<u32>
    where
        R: BufRead,
        F: FnMut(u32, u32),
    {
        self.wait_for_ncg()?;

        let mut state = TransferState {
            current: XmodemPacket::default(),
            retry_count: 0,
            packets_sent: 0,
        };

        loop {
            let filled = match state.current.fill_from(&mut source) {
                Ok(n) => n,
                Err(e) => {
                    self.abort();
                    return Err(e);
                },
            };
            state.current.compute_checksum();
            self.send_block(&mut state)?;

            state.packets_sent += 1;
            progress(state.packets_sent, total_packets);

            if filled < DATA_SIZE {
                break;
            }
            match source.fill_buf() {
                Ok(rest) if rest.is_empty() => break,
                Ok(_) => {},
                Err(e) => {
                    self.abort();
                    return Err(Error::FileRead(e));
                },
            }
            state.current = state.current.next();
        }

        debug!("End of transmission, {} packets sent", state.packets_sent);
        self.send_eot(state.packets_sent)?;
        Ok(state.packets_sent)
    }
}
