//! Protocol implementations.

pub mod command;
pub mod crc;
pub mod line;
pub mod xmodem;

// Re-export common types
pub use command::Command;
pub use line::LineWatcher;
pub use xmodem::{XmodemConfig, XmodemPacket, XmodemSender};
