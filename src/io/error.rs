// src/io/error.rs
//
// Error taxonomy for the transport and command channel.

use thiserror::Error;

/// Errors surfaced by the serial transport and the AT command channel.
///
/// `Transport` is fatal to the channel: the device is closed and every
/// subsequent command fails with the same error. `Command` is an ordinary
/// protocol outcome (the device replied `ERROR`) and leaves the channel
/// usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtError {
    /// The device path could not be opened.
    #[error("cannot open device {path}: {message}")]
    DeviceUnavailable { path: String, message: String },

    /// Another process holds the advisory lock on the device.
    #[error("device {path} is locked by another process")]
    DeviceLocked { path: String },

    /// I/O failure after a successful open. Fatal; never retried internally.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The device replied `ERROR`. Carries no payload.
    #[error("device replied ERROR")]
    Command,

    /// A notification sink is registered, so command/response correlation
    /// is disabled and `command()` could never observe a terminator.
    #[error("notification sink is registered; command/response correlation is disabled")]
    SinkActive,

    /// Channel misuse (double sink registration, background reader on a
    /// driven channel, and the like).
    #[error("{0}")]
    Config(String),
}
