//! Device session
//!
//! Connection state of one controller and the last error it hit. The state
//! machine is explicit, finite, and deterministic.

pub mod events;
pub mod machine;

pub use events::Event;
pub use machine::State;

use log::info;

use crate::error::ControllerError;

/// Connection state plus the most recent failure
#[derive(Debug, Clone, Default)]
pub struct DeviceSession {
    state: State,
    last_error: Option<ControllerError>,
}

impl DeviceSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Connected, running or halted
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Apply an event and return the new state
    pub fn handle(&mut self, event: Event) -> State {
        let next = self.state.transition(event);
        if next != self.state {
            info!("session {:?} -> {:?} ({:?})", self.state, next, event);
        }
        self.state = next;
        next
    }

    pub fn last_error(&self) -> Option<&ControllerError> {
        self.last_error.as_ref()
    }

    pub fn record_error(&mut self, error: ControllerError) {
        self.last_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }
}
