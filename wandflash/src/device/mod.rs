//! Device selection.
//!
//! Turns the user's mode, device and baud choices into a concrete device
//! node, link kind and line rate. Auto mode probes the default nodes of each
//! link kind in order, USB first.

use crate::error::{Error, Result};
use crate::port::SerialConfig;
use crate::target::link::{LinkKind, LinkMode};
use log::{debug, trace};
use std::path::Path;
use std::time::Duration;

/// Link kinds probed in auto mode, in order.
const AUTO_PROBE_ORDER: [LinkKind; 2] = [LinkKind::Usb, LinkKind::Serial];

/// A resolved device endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedDevice {
    /// Device node path.
    pub path: String,
    /// Link kind.
    pub link: LinkKind,
    /// Line rate.
    pub baud: u32,
}

impl DetectedDevice {
    /// Port configuration for this endpoint.
    pub fn serial_config(&self, timeout: Duration) -> SerialConfig {
        SerialConfig::new(&self.path, self.baud).with_timeout(timeout)
    }
}

/// Resolve the device to use, probing the filesystem in auto mode.
///
/// An explicit `device` wins and its path decides the link kind; `mode` is
/// ignored then. An explicit `baud` overrides the link kind's default.
pub fn resolve_device(
    mode: LinkMode,
    device: Option<&str>,
    baud: Option<u32>,
) -> Result<DetectedDevice> {
    resolve_device_with(mode, device, baud, |path| Path::new(path).exists())
}

/// [`resolve_device`] with a custom existence check.
pub fn resolve_device_with<F>(
    mode: LinkMode,
    device: Option<&str>,
    baud: Option<u32>,
    exists: F,
) -> Result<DetectedDevice>
where
    F: Fn(&str) -> bool,
{
    let (path, link) = match (device, mode.kind()) {
        (Some(path), _) => {
            let link = LinkKind::from_device_path(path);
            if mode != LinkMode::Auto && mode.kind() != Some(link) {
                debug!("Ignoring mode {mode}, {path} is a {link} device");
            }
            (path.to_string(), link)
        },
        (None, Some(link)) => (link.default_device().to_string(), link),
        (None, None) => {
            let link = AUTO_PROBE_ORDER
                .into_iter()
                .find(|link| {
                    let found = exists(link.default_device());
                    trace!("Probing {}: {}", link.default_device(), found);
                    found
                })
                .ok_or_else(|| {
                    let tried: Vec<_> = AUTO_PROBE_ORDER.iter().map(LinkKind::default_device).collect();
                    Error::DeviceNotFound(format!("no device at {}", tried.join(" or ")))
                })?;
            (link.default_device().to_string(), link)
        },
    };

    let baud = baud.unwrap_or_else(|| link.default_baud());
    debug!("Using {link} device {path} at {baud} baud");
    Ok(DetectedDevice { path, link, baud })
}
