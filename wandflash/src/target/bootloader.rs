//! Bootloader detection and upload-mode handshake.
//!
//! ## Handshake Flow
//!
//! ```text
//! Idle -> ProbingBanner --match--> BannerConfirmed -> UploadRequested -> ReadyConfirmed
//!              |                        ^                    |
//!           timeout                   match               timeout
//!              v                        |                    v
//!        IdentifyRetry ('i') -----------+------timeout---> Failed
//! ```
//!
//! The bootloader prints `BOOTLOADER version <v> Chip ID <hex>` when it
//! starts and in answer to `'i'`; a bare `?` means it is up but did not
//! parse the last input. After `'u'` it answers `Ready` and waits for an
//! XMODEM transfer.

use crate::error::{Error, Result};
use crate::port::ByteChannel;
use crate::protocol::{Command, LineWatcher};
use crate::target::link::LinkKind;
use log::{debug, info, trace};
use regex::Regex;
use std::fmt;
use std::io::{Read, Write};
use std::time::Duration;

/// Banner line only.
pub const BANNER_PATTERN: &str =
    r"^BOOTLOADER version (?P<version>.+) Chip ID (?P<chip>[0-9A-F]+)(\r)?$";

/// Banner line or the bootloader's `?` prompt.
pub const BANNER_OR_PROMPT_PATTERN: &str =
    r"^(BOOTLOADER version (?P<version>.+) Chip ID (?P<chip>[0-9A-F]+)|\?)(\r)?$";

/// Upload mode confirmation.
pub const READY_PATTERN: &str = r"^Ready(\r)?$";

/// Default time allowed for each banner probe.
pub const DEFAULT_BANNER_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default time allowed for the `Ready` answer.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Handshake timing.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Deadline for each banner probe. Detection may take two probes.
    pub banner_timeout: Duration,
    /// Deadline for the `Ready` line after the upload request.
    pub ready_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            banner_timeout: DEFAULT_BANNER_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

impl HandshakeConfig {
    /// Set the banner probe deadline.
    #[must_use]
    pub fn with_banner_timeout(mut self, timeout: Duration) -> Self {
        self.banner_timeout = timeout;
        self
    }

    /// Set the `Ready` deadline.
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }
}

/// Identity reported in the bootloader banner.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BannerInfo {
    /// Bootloader version string.
    pub version: String,
    /// Chip ID, upper-case hex.
    pub chip_id: String,
}

impl BannerInfo {
    fn from_line(pattern: &Regex, line: &str) -> Option<Self> {
        let caps = pattern.captures(line)?;
        Some(Self {
            version: caps.name("version")?.as_str().to_string(),
            chip_id: caps.name("chip")?.as_str().to_string(),
        })
    }
}

impl fmt::Display for BannerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bootloader {} (chip ID {})", self.version, self.chip_id)
    }
}

/// Progress of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent or read yet.
    Idle,
    /// Waiting for a banner or prompt.
    ProbingBanner,
    /// Identify sent, waiting for a strict banner.
    IdentifyRetry,
    /// Bootloader answered.
    BannerConfirmed,
    /// Upload command sent.
    UploadRequested,
    /// Bootloader waits for the image.
    ReadyConfirmed,
    /// A deadline passed without the expected answer.
    Failed,
}

/// What is known about the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootloaderMode {
    /// Running firmware, or not answering.
    Unknown,
    /// Bootloader is running.
    BootloaderDetected,
    /// Bootloader accepts an image.
    UploadReady,
}

impl HandshakeState {
    /// Target mode implied by this state.
    pub fn mode(&self) -> BootloaderMode {
        match self {
            Self::Idle | Self::ProbingBanner | Self::IdentifyRetry | Self::Failed => {
                BootloaderMode::Unknown
            },
            Self::BannerConfirmed | Self::UploadRequested => BootloaderMode::BootloaderDetected,
            Self::ReadyConfirmed => BootloaderMode::UploadReady,
        }
    }
}

/// Drives the target from unknown state to "ready to receive".
pub struct BootloaderHandshake<'a, P: Read + Write> {
    port: &'a mut P,
    config: HandshakeConfig,
    watcher: LineWatcher,
    state: HandshakeState,
    banner: Option<BannerInfo>,
    strict: Regex,
    lenient: Regex,
    ready: Regex,
}

impl<'a, P: Read + Write> BootloaderHandshake<'a, P> {
    /// Create a handshake over an open link.
    pub fn new(port: &'a mut P, config: HandshakeConfig) -> Result<Self> {
        Ok(Self {
            port,
            config,
            watcher: LineWatcher::new(),
            state: HandshakeState::Idle,
            banner: None,
            strict: Regex::new(BANNER_PATTERN)?,
            lenient: Regex::new(BANNER_OR_PROMPT_PATTERN)?,
            ready: Regex::new(READY_PATTERN)?,
        })
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Target mode implied by the current state.
    pub fn mode(&self) -> BootloaderMode {
        self.state.mode()
    }

    /// Banner captured so far, if the bootloader printed one.
    pub fn banner(&self) -> Option<&BannerInfo> {
        self.banner.as_ref()
    }

    /// Consume the handshake, keeping the captured banner.
    pub fn into_banner(self) -> Option<BannerInfo> {
        self.banner
    }

    fn send_command(&mut self, command: Command) -> Result<()> {
        trace!("Sending {command} command");
        self.port.send_byte(command.as_byte())
    }

    /// Send the link's autobaud primer, if it has one.
    ///
    /// Only meaningful right after the link was opened and before the
    /// first probe.
    pub fn prime_autobaud(&mut self, link: LinkKind) -> Result<()> {
        if let Some(primer) = link.autobaud_primer() {
            debug!("Priming {link} link for autobaud");
            self.send_command(primer)?;
        }
        Ok(())
    }

    /// Wait up to `timeout` for a banner line.
    ///
    /// In lenient mode the `?` prompt also counts. Returns whether a line
    /// matched; only a broken link is an error.
    pub fn probe_banner(&mut self, strict: bool, timeout: Duration) -> Result<bool> {
        let pattern = if strict { &self.strict } else { &self.lenient };

        match self.watcher.wait_for(self.port, pattern, timeout)? {
            Some(line) => {
                if let Some(info) = BannerInfo::from_line(pattern, &line) {
                    debug!("Banner: {info}");
                    self.banner = Some(info);
                } else {
                    debug!("Bootloader prompt received");
                }
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Check that the bootloader is running.
    ///
    /// One lenient probe; on silence, send identify and try one strict
    /// probe with the same deadline.
    pub fn detect_bootloader(&mut self) -> Result<bool> {
        let timeout = self.config.banner_timeout;

        self.state = HandshakeState::ProbingBanner;
        if self.probe_banner(false, timeout)? {
            self.state = HandshakeState::BannerConfirmed;
            return Ok(true);
        }

        debug!("No banner within {timeout:?}, asking bootloader to identify");
        self.state = HandshakeState::IdentifyRetry;
        self.send_command(Command::Identify)?;
        if self.probe_banner(true, timeout)? {
            self.state = HandshakeState::BannerConfirmed;
            return Ok(true);
        }

        self.state = HandshakeState::Failed;
        Ok(false)
    }

    /// Switch the detected bootloader into upload mode.
    pub fn request_upload(&mut self) -> Result<bool> {
        if self.state != HandshakeState::BannerConfirmed {
            return Err(Error::IllegalState(
                "upload requested before the bootloader was detected",
            ));
        }

        self.send_command(Command::Upload)?;
        self.state = HandshakeState::UploadRequested;

        let ready = self
            .watcher
            .wait_for(self.port, &self.ready, self.config.ready_timeout)?;
        if ready.is_some() {
            self.state = HandshakeState::ReadyConfirmed;
            Ok(true)
        } else {
            self.state = HandshakeState::Failed;
            Ok(false)
        }
    }

    /// Full handshake: detection then upload request.
    ///
    /// An unmet deadline is reported as [`Error::DeviceNotFound`].
    pub fn prepare(&mut self) -> Result<()> {
        if !self.detect_bootloader()? {
            return Err(Error::DeviceNotFound(
                "bootloader did not answer".to_string(),
            ));
        }
        if !self.request_upload()? {
            return Err(Error::DeviceNotFound(
                "bootloader did not enter upload mode".to_string(),
            ));
        }
        match &self.banner {
            Some(banner) => info!("Device ready: {banner}"),
            None => info!("Device ready"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::MockSerial;
    use std::time::Instant;

    const BANNER: &[u8] = b"BOOTLOADER version 2.1 Chip ID 0A3F\r\n";

    fn quick() -> HandshakeConfig {
        HandshakeConfig::default()
            .with_banner_timeout(Duration::from_millis(30))
            .with_ready_timeout(Duration::from_millis(30))
    }

    #[test]
    fn test_patterns() {
        let strict = Regex::new(BANNER_PATTERN).unwrap();
        let lenient = Regex::new(BANNER_OR_PROMPT_PATTERN).unwrap();

        assert!(strict.is_match("BOOTLOADER version 1.0 Chip ID ABC123\r"));
        assert!(strict.is_match("BOOTLOADER version 1.0 Chip ID ABC123"));
        assert!(!strict.is_match("BOOTLOADER version 1.0 Chip ID abc123"));
        assert!(!strict.is_match("?"));
        assert!(lenient.is_match("?\r"));
        assert!(lenient.is_match("BOOTLOADER version x Chip ID 0"));
        assert!(!lenient.is_match("?? "));
    }

    #[test]
    fn test_banner_info_capture() {
        let strict = Regex::new(BANNER_PATTERN).unwrap();
        let info = BannerInfo::from_line(&strict, "BOOTLOADER version 2.1 rc Chip ID 0A3F\r").unwrap();
        assert_eq!(info.version, "2.1 rc");
        assert_eq!(info.chip_id, "0A3F");
    }

    #[test]
    fn test_detect_on_first_probe() {
        let mut port = MockSerial::new(BANNER);
        let mut handshake = BootloaderHandshake::new(&mut port, quick()).unwrap();

        assert!(handshake.detect_bootloader().unwrap());
        assert_eq!(handshake.state(), HandshakeState::BannerConfirmed);
        assert_eq!(handshake.mode(), BootloaderMode::BootloaderDetected);
        assert_eq!(handshake.banner().unwrap().chip_id, "0A3F");
        drop(handshake);
        assert!(port.written().is_empty());
    }

    #[test]
    fn test_detect_prompt_has_no_banner() {
        let mut port = MockSerial::new(b"?\r\n");
        let mut handshake = BootloaderHandshake::new(&mut port, quick()).unwrap();

        assert!(handshake.detect_bootloader().unwrap());
        assert!(handshake.banner().is_none());
    }

    #[test]
    fn test_detect_after_identify() {
        let mut port = MockSerial::new(b"app running\r\n").reply_to(b'i', BANNER);
        let mut handshake = BootloaderHandshake::new(&mut port, quick()).unwrap();

        assert!(handshake.detect_bootloader().unwrap());
        assert_eq!(handshake.banner().unwrap().version, "2.1");
        drop(handshake);
        assert_eq!(port.written(), b"i");
    }

    #[test]
    fn test_identify_retry_is_strict() {
        let mut port = MockSerial::new(b"").reply_to(b'i', b"?\r\n");
        let mut handshake = BootloaderHandshake::new(&mut port, quick()).unwrap();

        assert!(!handshake.detect_bootloader().unwrap());
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[test]
    fn test_detect_fails_within_deadline_budget() {
        let mut port = MockSerial::new(b"noise\r\nmore noise\r\n");
        let config = quick();
        let budget = config.banner_timeout * 2;
        let mut handshake = BootloaderHandshake::new(&mut port, config).unwrap();

        let start = Instant::now();
        assert!(!handshake.detect_bootloader().unwrap());
        let elapsed = start.elapsed();

        assert!(elapsed >= budget);
        assert!(elapsed < budget + Duration::from_millis(500));
        assert_eq!(handshake.mode(), BootloaderMode::Unknown);
    }

    #[test]
    fn test_request_upload() {
        let mut port = MockSerial::new(BANNER).reply_to(b'u', b"Ready\r\n");
        let mut handshake = BootloaderHandshake::new(&mut port, quick()).unwrap();

        handshake.prepare().unwrap();
        assert_eq!(handshake.state(), HandshakeState::ReadyConfirmed);
        assert_eq!(handshake.mode(), BootloaderMode::UploadReady);
        drop(handshake);
        assert_eq!(port.written(), b"u");
    }

    #[test]
    fn test_request_upload_requires_detection() {
        let mut port = MockSerial::new(b"");
        let mut handshake = BootloaderHandshake::new(&mut port, quick()).unwrap();

        assert!(matches!(
            handshake.request_upload(),
            Err(Error::IllegalState(_))
        ));
    }

    #[test]
    fn test_prepare_without_ready_is_device_not_found() {
        let mut port = MockSerial::new(BANNER);
        let mut handshake = BootloaderHandshake::new(&mut port, quick()).unwrap();

        let err = handshake.prepare().unwrap_err();
        assert!(err.is_device_not_found());
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[test]
    fn test_prepare_silent_device() {
        let mut port = MockSerial::new(b"");
        let mut handshake = BootloaderHandshake::new(&mut port, quick()).unwrap();
        assert!(handshake.prepare().unwrap_err().is_device_not_found());
    }

    #[test]
    fn test_broken_link_is_not_device_not_found() {
        let mut port = MockSerial::broken();
        let mut handshake = BootloaderHandshake::new(&mut port, quick()).unwrap();
        assert!(matches!(handshake.prepare(), Err(Error::Channel(_))));
    }

    #[test]
    fn test_autobaud_primer_per_link() {
        let mut port = MockSerial::new(b"");
        let mut handshake = BootloaderHandshake::new(&mut port, quick()).unwrap();
        handshake.prime_autobaud(LinkKind::Usb).unwrap();
        handshake.prime_autobaud(LinkKind::Serial).unwrap();
        drop(handshake);
        assert_eq!(port.written(), b"U");
    }
}
