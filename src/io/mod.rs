// src/io/mod.rs
//
// IO layers for the AT channel.
// `serial` owns the physical device (open, lock, tune, line I/O);
// `at` implements the half-duplex command/response protocol on top of it.

pub mod at;
pub mod error;
pub mod serial;

pub use error::AtError;

use std::sync::Arc;

/// Byte-stream-to-line transport consumed by the command channel.
///
/// Exactly one logical reader may call `read_line` at a time (the channel
/// enforces this); `write_line` may be called concurrently with a blocked
/// read and must not wait for it.
pub trait LineTransport: Send + Sync + 'static {
    /// Block up to the transport's read timeout for a newline-terminated
    /// line. `Ok(Some(line))` with surrounding whitespace stripped,
    /// `Ok(None)` on timeout (partial input stays buffered), `Err` on an
    /// unrecoverable I/O failure. Errors are fatal: the caller must not
    /// retry against a dead handle.
    fn read_line(&self) -> Result<Option<String>, AtError>;

    /// Write `text` followed by CR LF and flush.
    fn write_line(&self, text: &str) -> Result<(), AtError>;

    /// Release the device. Idempotent, best-effort.
    fn close(&self);
}

impl<T: LineTransport> LineTransport for Arc<T> {
    fn read_line(&self) -> Result<Option<String>, AtError> {
        (**self).read_line()
    }

    fn write_line(&self, text: &str) -> Result<(), AtError> {
        (**self).write_line(text)
    }

    fn close(&self) {
        (**self).close()
    }
}
