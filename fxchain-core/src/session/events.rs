//! Events that trigger session transitions

/// Outcomes of controller operations that move the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    // Handshake
    /// Device answered the no-op with `"Noop"`
    HandshakeSucceeded,
    /// Handshake reply missing or wrong
    HandshakeFailed,

    // Chain control
    /// A chain upload or block load finished and the device runs it
    FiltersApplied,
    /// Device acknowledged halt and fell back to passthrough
    HaltAcknowledged,

    // Link
    /// Caller closed the link
    Closed,
    /// Link reported closed after a transport failure
    LinkLost,
}

impl Event {
    /// Check if this event ends the connection
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Event::HandshakeFailed | Event::Closed | Event::LinkLost
        )
    }
}
