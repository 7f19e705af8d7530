//! # wandflash
//!
//! A library for flashing firmware onto Wandstem boards.
//!
//! The board's bootloader is detected and switched into upload mode with a
//! short textual handshake, then receives the image over XMODEM-CRC. This
//! crate provides:
//!
//! - Bootloader detection and upload handshake
//! - XMODEM transmitter (128-byte blocks, CRC16)
//! - CRC16-XMODEM checksum calculation
//! - Device selection for USB and serial adapter links
//! - Streaming of the board's console output
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wandflash::{FlashSession, LinkMode, NativePort, resolve_device};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device = resolve_device(LinkMode::Auto, None, None)?;
//!     let port = NativePort::new(device.serial_config(Duration::from_millis(500)));
//!
//!     let mut session = FlashSession::new(port, device.link);
//!     session.flash("firmware.bin".as_ref(), |sent, total| {
//!         println!("Flashing: {sent}/{total}");
//!     })?;
//!     session.close()?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod device;
pub mod error;
pub mod monitor;
pub mod port;
pub mod protocol;
pub mod target;

/// Shared stop flag for long-running loops.
///
/// Clones share the flag. Typically tripped from a Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    device::{DetectedDevice, resolve_device},
    error::{Error, Result},
    monitor::{drain_utf8_lossy, pipe_output},
    port::{ByteChannel, Port, SerialConfig},
    protocol::{crc::crc16_xmodem, xmodem::packet_count},
    target::{
        BannerInfo, BootloaderHandshake, BootloaderMode, FlashReport, FlashSession,
        HandshakeConfig, LinkKind, LinkMode, SessionConfig,
    },
};
