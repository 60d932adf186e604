// src/io/serial/transport.rs
//
// Exclusive owner of the physical serial device. Opens the tty at the fixed
// channel settings, takes the advisory lock, applies best-effort latency
// tuning, and exposes line-buffered read/write. Reading and writing go
// through independently cloned handles so a blocked read never delays a
// write.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serialport::{ClearBuffer, SerialPort};

use super::lines::LineSplitter;
#[cfg(unix)]
use super::tty;
use crate::io::error::AtError;
use crate::io::LineTransport;

#[cfg(unix)]
use serialport::TTYPort as NativePort;
#[cfg(windows)]
use serialport::COMPort as NativePort;

/// Fixed channel baud rate. Not externally tunable.
pub const BAUD_RATE: u32 = 115_200;

/// Fixed blocking read timeout for one line attempt.
pub const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Settle delay between clearing the driver buffers and the cancel byte.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// ESC cancels any partially typed command on the device side.
const ESC: u8 = 0x1b;

struct ReadHalf {
    port: NativePort,
    splitter: LineSplitter,
}

/// Serial transport bound to one tty device for the process lifetime.
pub struct SerialTransport {
    path: String,
    reader: Mutex<ReadHalf>,
    writer: Mutex<NativePort>,
    closed: AtomicBool,
    #[cfg(unix)]
    lock_fd: std::os::unix::io::RawFd,
}

impl SerialTransport {
    /// Open `path` at the fixed baud rate and read timeout, take the
    /// advisory exclusive lock, tune latency, and reset the device.
    ///
    /// The lock is advisory: it guards against a second cooperating process
    /// accidentally attaching to the same device, and nothing more.
    pub fn open(path: &str) -> Result<Self, AtError> {
        info!("connecting on device {}", path);

        let port = serialport::new(path, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open_native()
            .map_err(|e| AtError::DeviceUnavailable {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            if !matches!(tty::try_exclusive_lock(port.as_raw_fd()), Ok(true)) {
                return Err(AtError::DeviceLocked {
                    path: path.to_string(),
                });
            }
            if let Err(e) = tty::set_low_latency(port.as_raw_fd()) {
                warn!("low-latency tuning unavailable on {}: {}", path, e);
            }
        }

        let transport = Self::from_port(port, path)?;
        transport.reset()?;

        info!("connected on device {}", path);
        Ok(transport)
    }

    /// Wrap an already open port without locking, tuning, or resetting.
    pub(crate) fn from_port(port: NativePort, path: &str) -> Result<Self, AtError> {
        #[cfg(unix)]
        let lock_fd = {
            use std::os::unix::io::AsRawFd;
            port.as_raw_fd()
        };

        let writer = port.try_clone_native().map_err(|e| AtError::DeviceUnavailable {
            path: path.to_string(),
            message: format!("clone for write half: {}", e),
        })?;

        Ok(SerialTransport {
            path: path.to_string(),
            reader: Mutex::new(ReadHalf {
                port,
                splitter: LineSplitter::new(),
            }),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
            #[cfg(unix)]
            lock_fd,
        })
    }

    /// Drain pending output, clear both driver buffers, let the device
    /// settle, then send ESC to cancel any partially typed command on the
    /// far end. Performed once at startup.
    pub fn reset(&self) -> Result<(), AtError> {
        {
            let mut writer = self.lock_writer();
            writer
                .flush()
                .map_err(|e| self.transport_err("flush", e))?;
        }
        {
            let mut reader = self.lock_reader();
            reader
                .port
                .clear(ClearBuffer::All)
                .map_err(|e| self.transport_err("clear buffers", e))?;
            reader.splitter.clear();
        }

        std::thread::sleep(SETTLE_DELAY);

        let mut writer = self.lock_writer();
        writer
            .write_all(&[ESC])
            .and_then(|_| writer.flush())
            .map_err(|e| self.transport_err("cancel byte", e))
    }

    /// Device path this transport was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock_reader(&self) -> MutexGuard<'_, ReadHalf> {
        self.reader.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_writer(&self) -> MutexGuard<'_, NativePort> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transport_err(&self, context: &str, err: impl std::fmt::Display) -> AtError {
        AtError::Transport(format!("{} on {}: {}", context, self.path, err))
    }

    fn closed_err(&self) -> AtError {
        AtError::Transport(format!("device {} is closed", self.path))
    }
}

impl LineTransport for SerialTransport {
    fn read_line(&self) -> Result<Option<String>, AtError> {
        let mut reader = self.lock_reader();

        if let Some(line) = reader.splitter.next_line() {
            debug!("read line {:?}", line);
            return Ok(Some(line));
        }

        let deadline = Instant::now() + READ_TIMEOUT;
        let mut chunk = [0u8; 256];

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(self.closed_err());
            }

            match reader.port.read(&mut chunk) {
                // EOF from a tty means the device went away
                Ok(0) => return Err(self.transport_err("read", "device disconnected")),
                Ok(n) => {
                    reader.splitter.feed(&chunk[..n]);
                    if let Some(line) = reader.splitter.next_line() {
                        debug!("read line {:?}", line);
                        return Ok(Some(line));
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(None),
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(self.transport_err("read", e)),
            }

            // Bytes are trickling in without a terminator; honor the
            // per-line timeout rather than blocking until one shows up.
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    fn write_line(&self, text: &str) -> Result<(), AtError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.closed_err());
        }

        debug!("write line {:?}", text);

        let mut frame = Vec::with_capacity(text.len() + 2);
        frame.extend_from_slice(text.as_bytes());
        frame.extend_from_slice(b"\r\n");

        let mut writer = self.lock_writer();
        writer
            .write_all(&frame)
            .and_then(|_| writer.flush())
            .map_err(|e| self.transport_err("write", e))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing device {}", self.path);
        #[cfg(unix)]
        tty::unlock(self.lock_fd);
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        LineTransport::close(self);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serialport::TTYPort;

    fn pty_transport(timeout: Duration) -> (TTYPort, SerialTransport) {
        let (mut master, mut slave) = TTYPort::pair().expect("pty pair");
        master.set_timeout(Duration::from_secs(1)).unwrap();
        slave.set_timeout(timeout).unwrap();
        let transport = SerialTransport::from_port(slave, "<pty>").unwrap();
        (master, transport)
    }

    #[test]
    fn test_read_lines_from_device() {
        let (mut master, transport) = pty_transport(Duration::from_millis(500));

        master
            .write_all(b"# boot banner\r\n$STATE=idle\r\nOK\r\n")
            .unwrap();

        assert_eq!(
            transport.read_line().unwrap(),
            Some("# boot banner".to_string())
        );
        assert_eq!(
            transport.read_line().unwrap(),
            Some("$STATE=idle".to_string())
        );
        assert_eq!(transport.read_line().unwrap(), Some("OK".to_string()));
    }

    #[test]
    fn test_write_line_appends_crlf() {
        let (mut master, transport) = pty_transport(Duration::from_millis(500));

        transport.write_line("AT$LED=1").unwrap();

        let expected = b"AT$LED=1\r\n";
        let mut got = Vec::new();
        let mut buf = [0u8; 64];
        while got.len() < expected.len() {
            match master.read(&mut buf) {
                Ok(n) if n > 0 => got.extend_from_slice(&buf[..n]),
                _ => break,
            }
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn test_read_timeout_returns_none() {
        let (_master, transport) = pty_transport(Duration::from_millis(50));
        assert_eq!(transport.read_line().unwrap(), None);
    }

    #[test]
    fn test_closed_transport_refuses_io() {
        let (_master, transport) = pty_transport(Duration::from_millis(50));
        transport.close();
        assert!(transport.read_line().is_err());
        assert!(transport.write_line("AT$PING").is_err());
        // close is idempotent
        transport.close();
    }
}
