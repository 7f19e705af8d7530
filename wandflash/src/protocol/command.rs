//! Single-byte bootloader commands.

use std::fmt;

/// Command understood by the bootloader, sent as one ASCII byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Autobaud primer, lets the target infer the line rate.
    Autobaud,
    /// Ask the bootloader to print its banner again.
    Identify,
    /// Switch the bootloader into XMODEM upload mode.
    Upload,
    /// Reboot into the freshly written image.
    Reboot,
}

impl Command {
    /// Wire byte.
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Autobaud => b'U',
            Self::Identify => b'i',
            Self::Upload => b'u',
            Self::Reboot => b'b',
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Autobaud => "autobaud",
            Self::Identify => "identify",
            Self::Upload => "upload",
            Self::Reboot => "reboot",
        };
        write!(f, "{name} ('{}')", self.as_byte() as char)
    }
}
