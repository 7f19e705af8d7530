//! Command implementations.
//!
//! Each action is implemented in its own module for clean separation.

pub(crate) mod flash;
pub(crate) mod monitor;
