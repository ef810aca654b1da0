//! Controller errors

use fxchain_hal::TransportError;
use fxchain_protocol::{FrameError, Malformed, ReplyError, Response};
use thiserror::Error;

/// A value rejected before anything was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangeError {
    #[error("frequency {0} Hz is outside 1-44000")]
    Frequency(u32),
    #[error("storage block {0} is outside 0-255")]
    Block(u32),
    #[error("{0} filters do not fit the one-byte upload count")]
    FilterCount(usize),
}

/// Errors returned by [`DeviceController`](crate::DeviceController)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerError {
    /// Operation requires a connected session
    #[error("device is not connected")]
    NotConnected,
    /// The link failed underneath the command
    #[error("transport: {0}")]
    Transport(TransportError),
    /// The device answered something other than the expected acknowledgement
    #[error("expected \"{expected}\", device answered \"{received}\"")]
    ProtocolMismatch {
        expected: &'static str,
        received: Response,
    },
    /// Argument rejected client-side; no I/O happened
    #[error(transparent)]
    Range(#[from] RangeError),
    /// Reply carried the right prefix but an unusable value
    #[error("malformed response: {0}")]
    MalformedResponse(Malformed),
    /// Command could not be encoded; nothing was written
    #[error("command does not fit a frame: {0:?}")]
    Encode(FrameError),
}

impl ControllerError {
    /// Firmware error code, if the device answered `"Error: <code>"`
    pub fn device_error_code(&self) -> Option<u16> {
        match self {
            ControllerError::ProtocolMismatch { received, .. } => received.device_error_code(),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ControllerError::Transport(_))
    }
}

impl From<TransportError> for ControllerError {
    fn from(e: TransportError) -> Self {
        ControllerError::Transport(e)
    }
}

impl From<FrameError> for ControllerError {
    fn from(e: FrameError) -> Self {
        ControllerError::Encode(e)
    }
}

impl From<Malformed> for ControllerError {
    fn from(e: Malformed) -> Self {
        ControllerError::MalformedResponse(e)
    }
}

impl From<ReplyError> for ControllerError {
    fn from(e: ReplyError) -> Self {
        match e {
            ReplyError::Mismatch { expected, received } => {
                ControllerError::ProtocolMismatch { expected, received }
            }
            ReplyError::Malformed(m) => ControllerError::MalformedResponse(m),
            // The controller stops feeding a sequence once it finishes
            ReplyError::Unsolicited => ControllerError::ProtocolMismatch {
                expected: "",
                received: Response::empty(),
            },
        }
    }
}
