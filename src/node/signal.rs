//! Signal LED pulsed after every payload hand-off.

use crate::error::NodeError;

/// Output line driving the signal LED
pub trait SignalLine: Send {
    /// `true` drives the LED on
    fn set_active(&mut self, active: bool) -> Result<(), NodeError>;
}

/// Host signal line; logs level changes
#[derive(Debug, Default)]
pub struct LogSignal {
    active: bool,
    pulses: u32,
}

impl LogSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Completed on/off pulses
    pub fn pulses(&self) -> u32 {
        self.pulses
    }
}

impl SignalLine for LogSignal {
    fn set_active(&mut self, active: bool) -> Result<(), NodeError> {
        if self.active && !active {
            self.pulses += 1;
        }
        self.active = active;
        // active low on the board
        log::trace!("signal line {}", if active { "LOW (on)" } else { "HIGH (off)" });
        Ok(())
    }
}
