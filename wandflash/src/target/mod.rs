//! Board-side logic: link kinds, bootloader handshake and the flash session.

pub mod bootloader;
pub mod flasher;
pub mod link;

pub use bootloader::{BannerInfo, BootloaderHandshake, BootloaderMode, HandshakeConfig, HandshakeState};
pub use flasher::{FlashReport, FlashSession, SessionConfig};
pub use link::{LinkKind, LinkMode};
