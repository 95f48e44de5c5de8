//! Mojo bootloader session.
//!
//! A [`MojoFlasher`] owns the port for the whole session and walks the
//! bootloader through a fixed sequence of phases:
//!
//! ```text
//! Init -> Erase                                        (erase)
//! Init -> Announce -> Length -> Transfer -> Load       (flash)
//! Init -> Announce -> Length -> Transfer -> Verify -> Load
//! Init -> Announce -> Length -> Transfer               (RAM only)
//! ```
//!
//! Each phase waits for its acknowledgement before the next one starts. The
//! first wrong byte or timeout ends the session; nothing is retried.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mojoflash::{Command, MojoFlasher, SourceImage};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut image = SourceImage::open("design.bin")?;
//!
//!     let mut flasher = MojoFlasher::open("/dev/ttyACM0")?;
//!     flasher.connect()?;
//!     flasher.flash(Command::FlashAndVerify, &mut image, |phase, done, total| {
//!         println!("{phase}: {done}/{total}");
//!     })?;
//!
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::image::SourceImage;
use crate::port::Port;
use crate::protocol::{
    ACK_DONE, ACK_LENGTH, ACK_READY, CMD_ERASE, CMD_LOAD, Command, DEFAULT_CHUNK_SIZE,
    ResetSequencer, TransferCodec, Verifier,
};
use log::{debug, info, trace};
use std::fmt;
use std::io::{Read, Seek};
use std::time::Duration;

/// Default bound on how long the device may take to answer.
///
/// Erasing and writing the flash happens before the acknowledgement is sent,
/// so this is generous.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    /// Input flush and reset pulse train.
    Init,
    /// Flash erase.
    Erase,
    /// Command byte, answered with `'R'`.
    Announce,
    /// Length header, answered with `'O'`.
    Length,
    /// Payload stream, answered with `'D'`.
    Transfer,
    /// Flash readback and comparison.
    Verify,
    /// Boot command, answered with `'D'`.
    Load,
}

impl Phase {
    /// Number used in diagnostics for phases that wait on a single byte.
    pub fn number(self) -> Option<u8> {
        match self {
            Self::Announce => Some(1),
            Self::Length => Some(2),
            Self::Transfer => Some(3),
            Self::Load => Some(4),
            Self::Init | Self::Erase | Self::Verify => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Erase => "erase",
            Self::Announce => "announce",
            Self::Length => "length",
            Self::Transfer => "transfer",
            Self::Verify => "verify",
            Self::Load => "load",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number() {
            Some(n) => write!(f, "Phase {n} ({})", self.label()),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Port open, board not reset yet.
    Opened,
    /// Board reset into its bootloader, ready for one command.
    Ready,
    /// Waiting on the given phase.
    Running(Phase),
    /// Command completed.
    Finished,
    /// The given phase failed; the session cannot continue.
    Failed(Phase),
}

/// How long to wait for each device reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Each reply must arrive within the port's own read timeout.
    PerRead,
    /// Wait up to the given duration for each reply.
    Deadline(Duration),
}

impl Default for WaitStrategy {
    fn default() -> Self {
        Self::Deadline(DEFAULT_ACK_TIMEOUT)
    }
}

/// Engine parameters.
///
/// These cover the differences between bootloader builds: payload chunk
/// size, how long replies may take, and whether RAM-only loading exists.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Payload and readback chunk size, in bytes.
    pub chunk_size: usize,
    /// Reply wait policy.
    pub wait: WaitStrategy,
    /// Whether the bootloader accepts the RAM-only command.
    pub supports_ram_only: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            wait: WaitStrategy::default(),
            supports_ram_only: true,
        }
    }
}

impl EngineConfig {
    /// Set the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the reply wait policy.
    #[must_use]
    pub fn with_wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }

    /// Enable or disable the RAM-only command.
    #[must_use]
    pub fn with_ram_only(mut self, supported: bool) -> Self {
        self.supports_ram_only = supported;
        self
    }
}

/// Outcome of waiting for a device reply byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Byte(u8),
    TimedOut,
}

impl Reply {
    fn byte(self) -> Option<u8> {
        match self {
            Self::Byte(b) => Some(b),
            Self::TimedOut => None,
        }
    }
}

/// Mojo bootloader session.
///
/// Generic over the port type `P`, which must implement the `Port` trait.
pub struct MojoFlasher<P: Port> {
    port: P,
    codec: TransferCodec,
    config: EngineConfig,
    state: SessionState,
}

impl<P: Port> MojoFlasher<P> {
    /// Create a session over an opened port with default parameters.
    pub fn new(port: P) -> Self {
        Self {
            port,
            codec: TransferCodec::default(),
            config: EngineConfig::default(),
            state: SessionState::Opened,
        }
    }

    /// Create a session with explicit engine parameters.
    pub fn with_config(port: P, config: EngineConfig) -> Result<Self> {
        let codec = TransferCodec::new(config.chunk_size)?;
        Ok(Self {
            port,
            codec,
            config,
            state: SessionState::Opened,
        })
    }

    /// Engine parameters in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the session and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Close the port, ending the session.
    pub fn close(&mut self) -> Result<()> {
        debug!("Closing {}", self.port.name());
        self.port.close()
    }

    fn ack_timeout(&self) -> Duration {
        match self.config.wait {
            WaitStrategy::PerRead => self.port.timeout(),
            WaitStrategy::Deadline(limit) => limit,
        }
    }

    /// Reset the board into its bootloader.
    ///
    /// Discards stale input, then runs the reset pulse train. Allowed once
    /// per session.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Opened {
            return Err(Error::InvalidState(format!(
                "connect called while {:?}",
                self.state
            )));
        }

        info!("Resetting board on {}", self.port.name());
        self.state = SessionState::Running(Phase::Init);
        let result = self
            .port
            .clear_input()
            .and_then(|()| ResetSequencer::new().reset(&mut self.port));
        self.settle(Phase::Init, result, SessionState::Ready)
    }

    /// Erase the flash. The session ends afterwards.
    ///
    /// Succeeds only if the device acknowledges with `'D'`.
    pub fn erase(&mut self) -> Result<()> {
        self.begin()?;
        info!("Erasing flash...");
        let result = self.run_erase();
        self.settle(Phase::Erase, result, SessionState::Finished)
    }

    /// Transfer `image` using a flash command. The session ends afterwards.
    ///
    /// `progress` receives `(phase, done, total)` during the transfer and
    /// verify phases.
    pub fn flash<R, F>(
        &mut self,
        command: Command,
        image: &mut SourceImage<R>,
        mut progress: F,
    ) -> Result<()>
    where
        R: Read + Seek,
        F: FnMut(Phase, u64, u64),
    {
        let Some(announce) = command.announce_byte() else {
            return Err(Error::InvalidState(
                "erase does not transfer an image; use erase()".into(),
            ));
        };
        if command == Command::FlashToRamOnly && !self.config.supports_ram_only {
            return Err(Error::Unsupported(
                "this bootloader does not support loading to RAM".into(),
            ));
        }
        self.begin()?;

        info!("Starting {command} of {} bytes", image.len());

        self.enter(Phase::Announce);
        let result = self
            .port
            .write_all_bytes(&[announce])
            .and_then(|()| self.expect_ack(Phase::Announce, ACK_READY));
        self.settle(Phase::Announce, result, SessionState::Running(Phase::Length))?;

        let result = self
            .codec
            .send_length(&mut self.port, image.len())
            .and_then(|()| self.expect_ack(Phase::Length, ACK_LENGTH));
        self.settle(Phase::Length, result, SessionState::Running(Phase::Transfer))?;

        let result = self
            .codec
            .send_payload(&mut self.port, image, |done, total| {
                progress(Phase::Transfer, done, total);
            })
            .and_then(|sent| {
                debug!("Sent {sent} payload bytes");
                self.expect_ack(Phase::Transfer, ACK_DONE)
            });
        let next = if command.verifies() {
            Phase::Verify
        } else {
            Phase::Load
        };
        self.settle(Phase::Transfer, result, SessionState::Running(next))?;

        if command.verifies() {
            info!("Verifying...");
            let verifier = Verifier::new(self.codec.chunk_size(), self.ack_timeout());
            let result = verifier.verify(&mut self.port, image, |done, total| {
                progress(Phase::Verify, done, total);
            });
            self.settle(Phase::Verify, result, SessionState::Running(Phase::Load))?;
            info!("Verify OK");
        }

        if !command.loads() {
            info!("Image loaded to RAM");
            self.state = SessionState::Finished;
            return Ok(());
        }

        let result = self
            .port
            .write_all_bytes(&[CMD_LOAD])
            .and_then(|()| self.expect_ack(Phase::Load, ACK_DONE));
        self.settle(Phase::Load, result, SessionState::Finished)?;

        info!("Flashing complete!");
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        if self.state == SessionState::Ready {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "a command needs a freshly reset board, session is {:?}",
                self.state
            )))
        }
    }

    fn enter(&mut self, phase: Phase) {
        trace!("Entering {phase}");
        self.state = SessionState::Running(phase);
    }

    /// Record the outcome of `phase` and move to `next` on success.
    fn settle<T>(&mut self, phase: Phase, result: Result<T>, next: SessionState) -> Result<T> {
        match result {
            Ok(value) => {
                self.state = next;
                Ok(value)
            },
            Err(e) => {
                debug!("{phase} failed: {e}");
                self.state = SessionState::Failed(phase);
                Err(e)
            },
        }
    }

    fn run_erase(&mut self) -> Result<()> {
        self.enter(Phase::Erase);
        self.port.write_all_bytes(&[CMD_ERASE])?;
        match self.await_reply()? {
            Reply::Byte(ACK_DONE) => {
                info!("Flash erased");
                Ok(())
            },
            other => Err(Error::EraseFailed { got: other.byte() }),
        }
    }

    fn await_reply(&mut self) -> Result<Reply> {
        let timeout = self.ack_timeout();
        let reply = match self
            .port
            .read_reply(1, timeout)?
            .first()
        {
            Some(&b) => Reply::Byte(b),
            None => Reply::TimedOut,
        };
        trace!("Reply: {reply:?}");
        Ok(reply)
    }

    fn expect_ack(&mut self, phase: Phase, expected: u8) -> Result<()> {
        match self.await_reply()? {
            Reply::Byte(b) if b == expected => {
                debug!("{phase} acknowledged");
                Ok(())
            },
            other => Err(Error::Phase {
                phase,
                expected,
                got: other.byte(),
            }),
        }
    }
}

// Native-specific convenience functions
#[cfg(feature = "native")]
mod native_impl {
    use super::{EngineConfig, MojoFlasher, Result};
    use crate::port::{NativePort, SerialConfig};

    impl MojoFlasher<NativePort> {
        /// Open a session on a serial device with default settings.
        ///
        /// # Arguments
        ///
        /// * `port_name` - Serial port name (e.g., "/dev/ttyACM0" or "COM3")
        pub fn open(port_name: &str) -> Result<Self> {
            Self::open_with(&SerialConfig::new(port_name), EngineConfig::default())
        }

        /// Open a session with explicit serial and engine settings.
        pub fn open_with(serial: &SerialConfig, config: EngineConfig) -> Result<Self> {
            let port = NativePort::open(serial)?;
            Self::with_config(port, config)
        }
    }
}
