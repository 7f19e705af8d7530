//! Error types for wandflash.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for wandflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for wandflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The device is missing, or it never completed the bootloader handshake.
    #[error("Device not found or not responding: {0}")]
    DeviceNotFound(String),

    /// The binary image is missing or cannot be opened.
    #[error("Binary not found: {}", path.display())]
    BinaryNotFound {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying open failure.
        #[source]
        source: io::Error,
    },

    /// The target never sent the CRC transfer request.
    #[error("The device is not accepting the transmission using XMODEM protocol")]
    ProtocolRejected,

    /// The target sent CAN CAN in place of an acknowledge.
    #[error("Transmission cancelled by target")]
    CancelledByTarget,

    /// A block went unacknowledged for every allowed attempt.
    #[error("Too many errors while sending packet {block}, transmission aborted after {attempts} attempts")]
    TooManyRetries {
        /// Block number of the failing packet.
        block: u8,
        /// Number of transmissions attempted.
        attempts: u32,
    },

    /// Every data block was acknowledged but the closing EOT was not.
    #[error("Remote target did not ACK end of transmission ({packets} packets sent)")]
    EotNotAcknowledged {
        /// Data packets transferred before the EOT exchange.
        packets: u32,
    },

    /// Reading the image failed before it was exhausted.
    #[error("Binary file read error: {0}")]
    FileRead(#[source] io::Error),

    /// Hard fault on the link to the device (unplugged, descriptor error).
    #[error("Link I/O error: {0}")]
    Channel(#[from] io::Error),

    /// Writing device output to the host failed.
    #[error("Output error: {0}")]
    Output(#[source] io::Error),

    /// Serial driver error while opening or configuring the port.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// An operation was invoked in a state that does not allow it.
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),

    /// Unknown link mode name.
    #[error("Invalid mode '{0}', expected auto, usb or serial")]
    InvalidMode(String),

    /// A response pattern failed to compile.
    #[error("Invalid response pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Unsupported operation for the selected link.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Whether the failure leaves the flashed image intact.
    ///
    /// Only a missing EOT acknowledge qualifies: the payload was fully
    /// delivered, the closing exchange was not.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::EotNotAcknowledged { .. })
    }

    /// Whether the failure means the board could not be reached.
    pub fn is_device_not_found(&self) -> bool {
        matches!(self, Self::DeviceNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_classification() {
        assert!(Error::EotNotAcknowledged { packets: 3 }.is_soft());
        assert!(!Error::CancelledByTarget.is_soft());
        assert!(!Error::ProtocolRejected.is_soft());
    }

    #[test]
    fn test_display_mentions_block() {
        let err = Error::TooManyRetries {
            block: 7,
            attempts: 5,
        };
        assert!(err.to_string().contains("packet 7"));
    }
}
