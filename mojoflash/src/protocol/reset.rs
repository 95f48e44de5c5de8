//! Bootloader entry via the control line.
//!
//! The Mojo's reset circuit watches DTR. Toggling it in a fixed pattern
//! restarts the microcontroller into its bootloader. There is no
//! acknowledgement; the next command simply finds the bootloader listening.

use crate::error::Result;
use crate::port::ControlLine;
use log::{debug, trace};
use std::thread;
use std::time::Duration;

/// Spacing between control-line transitions.
pub const RESET_PULSE: Duration = Duration::from_millis(5);

/// Number of deassert/assert cycles after the initial deassert.
pub const RESET_CYCLES: usize = 5;

/// Total number of control-line transitions in one reset.
pub const RESET_TRANSITIONS: usize = 1 + 2 * RESET_CYCLES;

/// Fixed reset pulse train.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetSequencer;

impl ResetSequencer {
    /// Create a reset sequencer.
    pub fn new() -> Self {
        Self
    }

    /// Run the pulse train, sleeping the calling thread between transitions.
    pub fn reset<L: ControlLine + ?Sized>(&self, line: &mut L) -> Result<()> {
        self.reset_with(line, thread::sleep)
    }

    /// Run the pulse train with a caller-supplied delay function.
    pub fn reset_with<L, D>(&self, line: &mut L, mut delay: D) -> Result<()>
    where
        L: ControlLine + ?Sized,
        D: FnMut(Duration),
    {
        debug!("Resetting board into bootloader");

        line.set_control_line(false)?;
        delay(RESET_PULSE);

        for cycle in 0..RESET_CYCLES {
            trace!("Reset cycle {}/{RESET_CYCLES}", cycle + 1);
            line.set_control_line(false)?;
            delay(RESET_PULSE);
            line.set_control_line(true)?;
            delay(RESET_PULSE);
        }

        Ok(())
    }
}
