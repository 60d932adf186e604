// src/io/serial/mod.rs
//
// Serial device layer: exclusive tty ownership, platform latency tuning,
// and line-buffered byte I/O. No protocol knowledge lives here.

pub mod lines;
pub mod ports;
pub mod transport;
#[cfg(unix)]
pub(crate) mod tty;

pub use ports::{list_ports, PortInfo};
pub use transport::SerialTransport;
