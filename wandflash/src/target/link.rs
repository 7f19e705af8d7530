//! Link kinds and link selection modes.
//!
//! A board is reached either through its own USB CDC interface or through a
//! USB-to-UART adapter. The two differ only in defaults and in whether the
//! bootloader needs an autobaud primer, so they are plain data.

use crate::error::{Error, Result};
use crate::protocol::Command;
use std::fmt;
use std::str::FromStr;

/// Physical link to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LinkKind {
    /// Direct USB CDC-ACM connection.
    Usb,
    /// USB-to-UART adapter.
    Serial,
}

impl LinkKind {
    /// Device node used when none is given.
    #[must_use]
    pub fn default_device(&self) -> &'static str {
        match self {
            Self::Usb => "/dev/ttyACM0",
            Self::Serial => "/dev/ttyUSB0",
        }
    }

    /// Line rate used when none is given.
    #[must_use]
    pub fn default_baud(&self) -> u32 {
        match self {
            Self::Usb => 9600,
            Self::Serial => 115_200,
        }
    }

    /// Primer to send right after the link is opened, if any.
    #[must_use]
    pub fn autobaud_primer(&self) -> Option<Command> {
        match self {
            Self::Usb => None,
            Self::Serial => Some(Command::Autobaud),
        }
    }

    /// Whether the bootloader must be primed before it can talk.
    pub fn needs_autobaud(&self) -> bool {
        self.autobaud_primer().is_some()
    }

    /// Whether the device output can be streamed to the host.
    pub fn supports_output(&self) -> bool {
        matches!(self, Self::Serial)
    }

    /// Classify a device node by its path: CDC-ACM nodes are USB links,
    /// everything else goes through an adapter.
    pub fn from_device_path(path: &str) -> Self {
        if path.to_uppercase().contains("ACM") {
            Self::Usb
        } else {
            Self::Serial
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usb => write!(f, "USB"),
            Self::Serial => write!(f, "serial"),
        }
    }
}

/// How the link kind is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LinkMode {
    /// Probe the default device nodes, USB first.
    #[default]
    #[cfg_attr(feature = "serde", serde(alias = "a"))]
    Auto,
    /// Force a USB link.
    #[cfg_attr(feature = "serde", serde(alias = "u"))]
    Usb,
    /// Force a serial adapter link.
    #[cfg_attr(feature = "serde", serde(alias = "s"))]
    Serial,
}

impl LinkMode {
    /// Parse a mode name (`a|auto`, `u|usb`, `s|serial`, any case).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "a" | "auto" => Some(Self::Auto),
            "u" | "usb" => Some(Self::Usb),
            "s" | "serial" => Some(Self::Serial),
            _ => None,
        }
    }

    /// The forced link kind, `None` in auto mode.
    pub fn kind(&self) -> Option<LinkKind> {
        match self {
            Self::Auto => None,
            Self::Usb => Some(LinkKind::Usb),
            Self::Serial => Some(LinkKind::Serial),
        }
    }
}

impl FromStr for LinkMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| Error::InvalidMode(s.to_string()))
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Usb => write!(f, "usb"),
            Self::Serial => write!(f, "serial"),
        }
    }
}
