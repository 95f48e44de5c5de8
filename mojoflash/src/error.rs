//! Error types for mojoflash.

use crate::flasher::Phase;
use std::io;
use thiserror::Error;

/// Result type for mojoflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mojoflash operations.
///
/// Every variant is terminal for the session: the engine never retries, so the
/// whole flashing sequence must be re-run after any of these.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port read failure, source image access).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error raised after the port was opened (control line, buffers).
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The device could not be opened or its line discipline could not be set.
    #[error("Failed to open and configure {port}: {source}")]
    Configuration {
        /// Device path that was being opened.
        port: String,
        /// Underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The expected acknowledgement for a phase was not received.
    #[error("{phase}: expected {}, {}", show_byte(.expected), describe_reply(.got))]
    Phase {
        /// Phase that failed.
        phase: Phase,
        /// Acknowledgement byte the phase requires.
        expected: u8,
        /// Byte actually received, `None` on timeout.
        got: Option<u8>,
    },

    /// The device did not confirm the flash erase.
    #[error("Erase failed: expected {}, {}", show_byte(&crate::protocol::ACK_DONE), describe_reply(.got))]
    EraseFailed {
        /// Byte actually received, `None` on timeout.
        got: Option<u8>,
    },

    /// A payload chunk could not be written in full.
    #[error("Transfer failed at byte offset {offset}: {source}")]
    Transfer {
        /// Offset of the first byte of the failed chunk.
        offset: u64,
        /// Underlying write error.
        #[source]
        source: io::Error,
    },

    /// The readback reply did not start with a valid header.
    #[error("Verify failed: device did not send a valid header (received {})", show_bytes(.received))]
    InvalidVerifyHeader {
        /// Header bytes actually received.
        received: Vec<u8>,
    },

    /// The device reports a stored image size different from the source image.
    #[error("Verify failed: size mismatch, expected {expected} bytes, device holds {actual}")]
    SizeMismatch {
        /// Length of the source image.
        expected: u32,
        /// Content length announced by the device.
        actual: u32,
    },

    /// A readback byte differs from the source image.
    #[error("Verify failed: data mismatch at offset {offset}, expected {expected:#04x}, got {actual:#04x}")]
    DataMismatch {
        /// 1-based offset of the differing byte within the payload.
        offset: u64,
        /// Byte in the source image.
        expected: u8,
        /// Byte read back from the device.
        actual: u8,
    },

    /// The device stopped sending readback data before the announced length.
    #[error("Verify failed: readback ended after {received} of {expected} bytes")]
    ReadbackTruncated {
        /// Announced content length.
        expected: u32,
        /// Bytes received and compared before the device went silent.
        received: u64,
    },

    /// The source image does not fit in the 32-bit length header.
    #[error("Image of {len} bytes exceeds the 4 GiB protocol limit")]
    ImageTooLarge {
        /// Actual size of the source.
        len: u64,
    },

    /// Operation not supported by the current engine configuration.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation issued out of order for the session.
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

fn show_byte(byte: &u8) -> String {
    if byte.is_ascii_graphic() {
        format!("'{}'", char::from(*byte))
    } else {
        format!("{byte:#04x}")
    }
}

fn show_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "nothing".into();
    }
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn describe_reply(got: &Option<u8>) -> String {
    match got {
        Some(byte) => format!("got {}", show_byte(byte)),
        None => "device did not respond".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_error_names_phase_and_byte() {
        let err = Error::Phase {
            phase: Phase::Announce,
            expected: b'R',
            got: Some(b'X'),
        };
        let msg = err.to_string();
        assert!(msg.contains("Phase 1"), "{msg}");
        assert!(msg.contains("'R'"), "{msg}");
        assert!(msg.contains("'X'"), "{msg}");
    }

    #[test]
    fn test_phase_error_timeout_message() {
        let err = Error::Phase {
            phase: Phase::Load,
            expected: b'D',
            got: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("Phase 4"), "{msg}");
        assert!(msg.contains("did not respond"), "{msg}");
    }

    #[test]
    fn test_non_printable_bytes_shown_as_hex() {
        let err = Error::EraseFailed { got: Some(0x00) };
        assert!(err.to_string().contains("0x00"));
    }

    #[test]
    fn test_data_mismatch_message() {
        let err = Error::DataMismatch {
            offset: 150,
            expected: 0x12,
            actual: 0x34,
        };
        assert_eq!(
            err.to_string(),
            "Verify failed: data mismatch at offset 150, expected 0x12, got 0x34"
        );
    }

    #[test]
    fn test_invalid_header_lists_received_bytes() {
        let err = Error::InvalidVerifyHeader {
            received: vec![0x55, 0x01],
        };
        assert!(err.to_string().contains("55 01"));
        let err = Error::InvalidVerifyHeader { received: vec![] };
        assert!(err.to_string().contains("nothing"));
    }
}
