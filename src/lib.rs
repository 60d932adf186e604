// src/lib.rs
//
// atlink: synchronous AT-command channel client for microcontroller-attached
// serial devices. The transport layer owns the tty (exclusive advisory lock,
// low-latency tuning, line I/O); the channel layer implements the half-duplex
// AT request/response protocol on top of it.

pub mod io;

pub use io::at::{AtChannel, ChannelMode};
pub use io::error::AtError;
pub use io::serial::{list_ports, PortInfo, SerialTransport};
pub use io::LineTransport;
