//! Mojo bootloader wire protocol.
//!
//! Every exchange is a single request answered by a single acknowledgement
//! byte. Multi-byte integers are little-endian.
//!
//! ```text
//! Phase      Host -> Device            Device -> Host
//! ---------  ------------------------  ----------------------------------
//! Erase      'E'                       'D'
//! Announce   'F' | 'V' | 'R'           'R'
//! Length     u32 image length          'O'
//! Transfer   image bytes               'D' after the last byte
//! Verify     'S'                       0xAA, u32 total length, image bytes
//! Load       'L'                       'D'
//! ```

use std::fmt;

pub mod reset;
pub mod transfer;
pub mod verify;

pub use reset::ResetSequencer;
pub use transfer::{TransferCodec, decode_length, encode_length};
pub use verify::{VerifyHeader, Verifier};

/// Erase the flash.
pub const CMD_ERASE: u8 = b'E';
/// Write to flash, then boot.
pub const CMD_FLASH: u8 = b'F';
/// Write to flash, then allow readback before booting.
pub const CMD_FLASH_VERIFY: u8 = b'V';
/// Load into RAM only.
pub const CMD_RAM: u8 = b'R';
/// Request flash readback.
pub const CMD_READBACK: u8 = b'S';
/// Boot the stored image.
pub const CMD_LOAD: u8 = b'L';

/// Device is ready for the length header.
pub const ACK_READY: u8 = b'R';
/// Length header accepted.
pub const ACK_LENGTH: u8 = b'O';
/// Operation finished.
pub const ACK_DONE: u8 = b'D';

/// Default payload chunk size, in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Operation requested from the bootloader.
///
/// Exactly one is selected per session. `Erase` never transfers an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Erase the flash and stop.
    Erase,
    /// Write the image to flash and boot it.
    FlashAndBoot,
    /// Write the image to flash, read it back for comparison, then boot it.
    FlashAndVerify,
    /// Load the image into RAM only; nothing is written to flash.
    FlashToRamOnly,
}

impl Command {
    /// Byte sent in the announce phase, `None` for [`Command::Erase`].
    #[must_use]
    pub fn announce_byte(self) -> Option<u8> {
        match self {
            Self::Erase => None,
            Self::FlashAndBoot => Some(CMD_FLASH),
            Self::FlashAndVerify => Some(CMD_FLASH_VERIFY),
            Self::FlashToRamOnly => Some(CMD_RAM),
        }
    }

    /// Whether the readback phase runs for this command.
    #[must_use]
    pub fn verifies(self) -> bool {
        self == Self::FlashAndVerify
    }

    /// Whether the load phase runs for this command.
    #[must_use]
    pub fn loads(self) -> bool {
        matches!(self, Self::FlashAndBoot | Self::FlashAndVerify)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Erase => write!(f, "erase"),
            Self::FlashAndBoot => write!(f, "flash"),
            Self::FlashAndVerify => write!(f, "flash and verify"),
            Self::FlashToRamOnly => write!(f, "load to RAM"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announce_bytes() {
        assert_eq!(Command::Erase.announce_byte(), None);
        assert_eq!(Command::FlashAndBoot.announce_byte(), Some(b'F'));
        assert_eq!(Command::FlashAndVerify.announce_byte(), Some(b'V'));
        assert_eq!(Command::FlashToRamOnly.announce_byte(), Some(b'R'));
    }

    #[test]
    fn test_phase_selection() {
        assert!(Command::FlashAndVerify.verifies());
        assert!(!Command::FlashAndBoot.verifies());
        assert!(!Command::FlashToRamOnly.verifies());

        assert!(Command::FlashAndBoot.loads());
        assert!(Command::FlashAndVerify.loads());
        assert!(!Command::FlashToRamOnly.loads());
        assert!(!Command::Erase.loads());
    }
}
