//! Bolt downlink protocol, version 1.
//!
//! A configuration is a sequence of single-command fragments. Multi-byte
//! fields are big-endian.

mod command;
mod decoder;
mod encoder;

pub use command::*;
pub use decoder::*;
pub use encoder::*;
