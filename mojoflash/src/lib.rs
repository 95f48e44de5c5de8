//! # mojoflash
//!
//! A library for programming the Mojo FPGA board through its serial
//! bootloader.
//!
//! This crate provides:
//!
//! - Port abstraction over a native serial device with a DTR control line
//! - The reset pulse train that puts the board into its bootloader
//! - The length-prefixed image transfer and readback verification
//! - A session engine that drives erase, flash, verify and load
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use mojoflash::{Command, MojoFlasher, SourceImage};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut image = SourceImage::open("design.bin")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let mut flasher = MojoFlasher::open("/dev/ttyACM0")?;
//!         flasher.connect()?;
//!         flasher.flash(Command::FlashAndBoot, &mut image, |phase, done, total| {
//!             println!("{phase}: {done}/{total}");
//!         })?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod flasher;
pub mod host;
pub mod image;
pub mod port;
pub mod protocol;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    error::{Error, Result},
    flasher::{EngineConfig, MojoFlasher, Phase, SessionState, WaitStrategy},
    host::{discover_ports, discover_usb_ports},
    image::SourceImage,
    port::{ControlLine, Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{Command, ResetSequencer, TransferCodec, Verifier},
};
