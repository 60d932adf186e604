// src/io/at/mod.rs
//
// Half-duplex AT command/response protocol on top of a line transport.

pub mod channel;
pub mod codec;

pub use channel::{AtChannel, ChannelMode};
