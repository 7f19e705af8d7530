//! Flash session: handshake, transfer, reboot.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wandflash::{FlashSession, LinkKind, NativePort, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let link = LinkKind::Serial;
//!     let port = NativePort::new(SerialConfig::new(link.default_device(), link.default_baud()));
//!
//!     let mut session = FlashSession::new(port, link);
//!     let report = session.flash("firmware.bin".as_ref(), |sent, total| {
//!         println!("{sent}/{total}");
//!     })?;
//!     println!("{} packets sent", report.packets_sent);
//!
//!     session.close()?;
//!     Ok(())
//! }
//! ```

use crate::CancelToken;
use crate::error::{Error, Result};
use crate::monitor::pipe_output;
use crate::port::{ByteChannel, Port};
use crate::protocol::xmodem::{XmodemConfig, XmodemSender, packet_count};
use crate::protocol::Command;
use crate::target::bootloader::{BannerInfo, BootloaderHandshake, HandshakeConfig};
use crate::target::link::LinkKind;
use log::{debug, info};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;

/// Session configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Handshake timing.
    pub handshake: HandshakeConfig,
    /// XMODEM retransmission policy.
    pub xmodem: XmodemConfig,
}

impl SessionConfig {
    /// Set the handshake configuration.
    #[must_use]
    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Set the XMODEM configuration.
    #[must_use]
    pub fn with_xmodem(mut self, xmodem: XmodemConfig) -> Self {
        self.xmodem = xmodem;
        self
    }
}

/// Outcome of a successful flash.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlashReport {
    /// Data packets transferred.
    pub packets_sent: u32,
    /// Banner printed by the bootloader, when it printed one.
    pub banner: Option<BannerInfo>,
}

/// Exclusive owner of the link to one board.
///
/// Generic over the port type `P`, so the whole sequence runs against any
/// `Port` implementation. The link is opened on demand and stays open until
/// [`FlashSession::close`], also after a failed operation.
pub struct FlashSession<P: Port> {
    port: P,
    link: LinkKind,
    config: SessionConfig,
}

impl<P: Port> FlashSession<P> {
    /// Create a session with default timing.
    pub fn new(port: P, link: LinkKind) -> Self {
        Self::with_config(port, link, SessionConfig::default())
    }

    /// Create a session with custom configuration.
    pub fn with_config(port: P, link: LinkKind, config: SessionConfig) -> Self {
        Self { port, link, config }
    }

    /// Link kind of this session.
    pub fn link(&self) -> LinkKind {
        self.link
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the session and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Open the link if needed. Returns whether it was freshly opened.
    fn ensure_open(&mut self) -> Result<bool> {
        if !self.port.is_present() {
            return Err(Error::DeviceNotFound(format!(
                "{} does not exist",
                self.port.name()
            )));
        }
        if self.port.is_open() {
            return Ok(false);
        }
        self.port.open()?;
        self.port.clear_buffers()?;
        debug!("Opened {} link on {}", self.link, self.port.name());
        Ok(true)
    }

    /// Write the image at `path` to the board and reboot it.
    ///
    /// `progress` receives (packets sent, total packets) after every
    /// acknowledged block.
    pub fn flash<F>(&mut self, path: &Path, progress: F) -> Result<FlashReport>
    where
        F: FnMut(u32, u32),
    {
        let (file, len) = File::open(path)
            .and_then(|file| {
                let metadata = file.metadata()?;
                if !metadata.is_file() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "not a regular file",
                    ));
                }
                Ok((file, metadata.len()))
            })
            .map_err(|source| Error::BinaryNotFound {
                path: path.to_path_buf(),
                source,
            })?;

        let fresh = self.ensure_open()?;

        info!("Waiting for bootloader on {}...", self.port.name());
        let mut handshake = BootloaderHandshake::new(&mut self.port, self.config.handshake.clone())?;
        if fresh {
            handshake.prime_autobaud(self.link)?;
        }
        handshake.prepare()?;
        let banner = handshake.into_banner();

        let total = packet_count(len);
        info!("Sending {} ({len} bytes, {total} packets)", path.display());
        let packets_sent = XmodemSender::with_config(&mut self.port, self.config.xmodem.clone())
            .send(BufReader::new(file), total, progress)?;

        debug!("Sending {} command", Command::Reboot);
        self.port.send_byte(Command::Reboot.as_byte())?;
        info!("Flash complete, {packets_sent} packets sent");

        Ok(FlashReport {
            packets_sent,
            banner,
        })
    }

    /// Stream the board's output to `out` until `cancel` is tripped.
    ///
    /// Only adapter links carry the board's console. Returns the number of
    /// bytes received.
    pub fn print_output<W: Write + ?Sized>(
        &mut self,
        out: &mut W,
        cancel: &CancelToken,
    ) -> Result<u64> {
        if !self.link.supports_output() {
            return Err(Error::Unsupported(
                "Cannot read standard output from a device connected in USB mode".to_string(),
            ));
        }
        self.ensure_open()?;
        info!("Printing output of {}, press Ctrl-C to stop", self.port.name());
        pipe_output(&mut self.port, out, cancel)
    }

    /// Close the link. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.port.close()
    }
}
