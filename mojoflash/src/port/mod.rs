//! Port abstraction for the serial link to the bootloader.
//!
//! The protocol engine never touches the operating system directly. It talks
//! to a [`Port`], which bundles the byte stream, a bounded reply read, input
//! flushing and the [`ControlLine`] capability used to reset the board.
//!
//! ```text
//! +------------------+
//! |  Protocol Engine |
//! | (reset, transfer,|
//! |  verify, phases) |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |    Port Trait    |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! | Native SerialPort|
//! |   (serialport)   |
//! +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use mojoflash::port::Port;
//! use std::time::Duration;
//!
//! fn example<P: Port>(port: &mut P) -> mojoflash::Result<()> {
//!     port.write_all_bytes(b"F")?;
//!     let reply = port.read_reply(1, Duration::from_secs(1))?;
//!     println!("Received: {reply:?}");
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use crate::error::Result;

/// Baud rate spoken by the Mojo bootloader.
pub const MOJO_BAUD: u32 = 115_200;

/// Default per-read timeout of the serial device.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Serial port configuration.
///
/// The line is always 8 data bits, no parity, one stop bit and no flow
/// control. Fixed for the lifetime of a session: [`Port`] has no operation to change
/// it once the device is open.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Per-read timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: MOJO_BAUD,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Create the bootloader configuration (115200 8N1, no flow control) for a port.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Default::default()
        }
    }

    /// Set the per-read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Control signal used to force the board into its bootloader.
///
/// On native ports this is the DTR line. "Asserted" means the signal is
/// active.
pub trait ControlLine {
    /// Drive the control line.
    fn set_control_line(&mut self, asserted: bool) -> Result<()>;
}

/// Channel to the bootloader.
pub trait Port: Read + Write + ControlLine + Send {
    /// Get the per-read timeout configured on the device.
    fn timeout(&self) -> Duration;

    /// Discard bytes received but not yet read.
    fn clear_input(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes in one call and flush.
    ///
    /// A short write is an error; the remainder is never resent.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        write_once(self, buf)?;
        Ok(())
    }

    /// Read up to `len` bytes, giving up once `timeout` has elapsed.
    ///
    /// Returns fewer bytes than requested (possibly none) on timeout. Port
    /// level timeouts are not errors; any other read failure is.
    fn read_reply(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; len];
        let mut filled = 0;

        while filled < len {
            match self.read(&mut buf[filled..]) {
                Ok(n) => filled += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {},
                Err(e) => return Err(e.into()),
            }
            if filled < len && Instant::now() >= deadline {
                break;
            }
        }

        buf.truncate(filled);
        Ok(buf)
    }
}

/// Write `buf` with a single `write` call, then flush.
///
/// Fails with [`ErrorKind::WriteZero`] unless the writer accepts every byte.
pub fn write_once<W: Write + ?Sized>(writer: &mut W, buf: &[u8]) -> std::io::Result<()> {
    if buf.is_empty() {
        return Ok(());
    }
    let n = writer.write(buf)?;
    if n != buf.len() {
        return Err(std::io::Error::new(
            ErrorKind::WriteZero,
            format!("short write: {n} of {} bytes accepted", buf.len()),
        ));
    }
    writer.flush()
}

/// Trait for listing available serial ports.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};

#[cfg(test)]
mod tests {
    use super::mock::MockPort;
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.timeout, DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyACM0").with_timeout(Duration::from_millis(250));

        assert_eq!(config.port_name, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, MOJO_BAUD);
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_read_reply_full() {
        let mut port = MockPort::new(b"RO");
        let reply = port
            .read_reply(2, Duration::from_millis(10))
            .unwrap();
        assert_eq!(reply, b"RO");
    }

    #[test]
    fn test_read_reply_short_on_timeout() {
        let mut port = MockPort::new(&[0xAA, 0x01]);
        let start = Instant::now();
        let reply = port
            .read_reply(5, Duration::from_millis(20))
            .unwrap();
        assert_eq!(reply, [0xAA, 0x01]);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_read_reply_empty_on_silence() {
        let mut port = MockPort::new(&[]);
        let reply = port
            .read_reply(1, Duration::from_millis(5))
            .unwrap();
        assert!(reply.is_empty());
    }

    #[test]
    fn test_read_reply_propagates_hard_errors() {
        let mut port = MockPort::new(b"R").with_read_error(ErrorKind::BrokenPipe);
        assert!(
            port.read_reply(1, Duration::from_millis(5))
                .is_err()
        );
    }

    #[test]
    fn test_write_all_bytes_short_write_is_error() {
        let mut port = MockPort::new(&[]).with_max_write(3);
        let err = port
            .write_all_bytes(&[0x2C, 0x01, 0x00, 0x00])
            .unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), ErrorKind::WriteZero),
            other => panic!("expected short write error, got {other}"),
        }
        // The rest of the buffer was not resent.
        assert_eq!(port.written(), [0x2C, 0x01, 0x00]);
    }

    #[test]
    fn test_write_once_accepts_full_write() {
        let mut out = Vec::new();
        write_once(&mut out, b"VSL").unwrap();
        write_once(&mut out, &[]).unwrap();
        assert_eq!(out, b"VSL");
    }

    #[test]
    fn test_write_all_bytes_records_output() {
        let mut port = MockPort::new(&[]);
        port.write_all_bytes(b"F")
            .unwrap();
        assert_eq!(port.written(), b"F");
    }
}
