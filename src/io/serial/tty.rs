// src/io/serial/tty.rs
//
// Unix-only tty capabilities: advisory exclusive locking and Linux
// low-latency tuning. Both operate on the raw file descriptor.

use std::io;
use std::os::unix::io::RawFd;

/// Attempt a non-blocking exclusive advisory lock on the descriptor.
///
/// Returns `Ok(false)` when another process already holds the lock. This is
/// advisory only: it excludes cooperating processes that also take the lock,
/// not arbitrary openers, and the check-then-use window is inherently racy.
pub fn try_exclusive_lock(fd: RawFd) -> io::Result<bool> {
    let rc = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EWOULDBLOCK) | Some(libc::EAGAIN) => Ok(false),
        _ => Err(err),
    }
}

/// Release the advisory lock. Best-effort; errors are ignored.
pub fn unlock(fd: RawFd) {
    unsafe {
        libc::flock(fd, libc::LOCK_UN);
    }
}

/// Set the serial driver's low-latency flag so received bytes are delivered
/// to userspace immediately instead of on the next flush tick. A performance
/// hint only; callers log and continue on failure.
#[cfg(target_os = "linux")]
pub fn set_low_latency(fd: RawFd) -> io::Result<()> {
    const TIOCGSERIAL: libc::c_ulong = 0x541E;
    const TIOCSSERIAL: libc::c_ulong = 0x541F;
    const ASYNC_LOW_LATENCY: libc::c_int = 0x2000;

    // include/uapi/linux/serial.h struct serial_struct
    #[repr(C)]
    struct SerialStruct {
        type_: libc::c_int,
        line: libc::c_int,
        port: libc::c_uint,
        irq: libc::c_int,
        flags: libc::c_int,
        xmit_fifo_size: libc::c_int,
        custom_divisor: libc::c_int,
        baud_base: libc::c_int,
        close_delay: libc::c_ushort,
        io_type: libc::c_char,
        reserved_char: [libc::c_char; 1],
        hub6: libc::c_int,
        closing_wait: libc::c_ushort,
        closing_wait2: libc::c_ushort,
        iomem_base: *mut libc::c_uchar,
        iomem_reg_shift: libc::c_ushort,
        port_high: libc::c_uint,
        iomap_base: libc::c_ulong,
    }

    let mut ss: SerialStruct = unsafe { std::mem::zeroed() };
    if unsafe { libc::ioctl(fd, TIOCGSERIAL as _, &mut ss) } != 0 {
        return Err(io::Error::last_os_error());
    }
    ss.flags |= ASYNC_LOW_LATENCY;
    if unsafe { libc::ioctl(fd, TIOCSSERIAL as _, &ss) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Low-latency tuning is a Linux serial-driver feature; elsewhere this is a
/// successful no-op.
#[cfg(not(target_os = "linux"))]
pub fn set_low_latency(_fd: RawFd) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn test_exclusive_lock_excludes_second_holder() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let first = File::open(tmp.path()).unwrap();
        let second = File::open(tmp.path()).unwrap();

        assert_eq!(try_exclusive_lock(first.as_raw_fd()).unwrap(), true);
        assert_eq!(try_exclusive_lock(second.as_raw_fd()).unwrap(), false);

        unlock(first.as_raw_fd());
        assert_eq!(try_exclusive_lock(second.as_raw_fd()).unwrap(), true);
        unlock(second.as_raw_fd());
    }

    #[test]
    fn test_unlock_without_lock_is_harmless() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let f = File::open(tmp.path()).unwrap();
        unlock(f.as_raw_fd());
    }
}
