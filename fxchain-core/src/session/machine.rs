//! Session state machine
//!
//! Which controller operations are allowed is a function of the current
//! state alone.

use super::events::Event;

/// Connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No handshake yet, or the link was closed
    #[default]
    Disconnected,
    /// Handshake done, device on its boot or last chain
    Connected,
    /// A chain uploaded or loaded by this session is running
    Running,
    /// Halt acknowledged; device is in passthrough
    Halted,
}

impl State {
    /// Check if commands may be sent in this state
    pub fn is_connected(&self) -> bool {
        !matches!(self, State::Disconnected)
    }

    /// Check if a chain applied by this session is running
    pub fn is_running(&self) -> bool {
        matches!(self, State::Running)
    }

    /// Process an event and return the next state
    pub fn transition(self, event: Event) -> Self {
        use Event::*;
        use State::*;

        match (self, event) {
            // Handshake
            (Disconnected, HandshakeSucceeded) => Connected,
            (_, HandshakeFailed) => Disconnected,

            // Chain control
            (Connected | Halted | Running, FiltersApplied) => Running,
            (Running, HaltAcknowledged) => Halted,

            // Link
            (Connected | Running | Halted, Closed | LinkLost) => Disconnected,

            // Default: stay in current state
            _ => self,
        }
    }
}
