//! Command channel
//!
//! Owns the transport and performs one exchange at a time: write a padded
//! frame, flush, read one line. The reply is returned as received; judging
//! it is left to the caller.

use fxchain_hal::{TransportError, TransportLink};
use fxchain_protocol::{Command, Response, FRAME_LEN, FRAME_PAD, MAX_RESPONSE_LEN};
use log::{debug, warn};

use crate::error::ControllerError;

/// Half-duplex command/response channel over a [`TransportLink`]
pub struct CommandChannel<L: TransportLink> {
    link: L,
    exchanges: usize,
}

impl<L: TransportLink> CommandChannel<L> {
    pub fn new(link: L) -> Self {
        Self { link, exchanges: 0 }
    }

    /// Send a raw payload and return the response line
    ///
    /// Payloads shorter than [`FRAME_LEN`] are right-padded with
    /// [`FRAME_PAD`]; longer ones go out untouched. An empty response means
    /// the read timed out.
    pub fn send_command(&mut self, payload: &[u8]) -> Result<Response, TransportError> {
        if payload.len() >= FRAME_LEN {
            self.write_frame(payload)?;
        } else {
            let mut frame = [FRAME_PAD; FRAME_LEN];
            frame[..payload.len()].copy_from_slice(payload);
            self.write_frame(&frame)?;
        }
        self.read_response(payload.first().copied())
    }

    /// Encode and send a protocol command
    ///
    /// An encoding failure is reported as [`ControllerError::Encode`]
    /// before anything reaches the link.
    pub fn send(&mut self, command: &Command<'_>) -> Result<Response, ControllerError> {
        let frame = command.to_frame()?;
        Ok(self.send_command(frame.as_bytes())?)
    }

    /// Completed write/read round trips since creation
    pub fn exchanges(&self) -> usize {
        self.exchanges
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        debug!("-> \"{}\"", frame.escape_ascii());
        self.link.write(frame)?;
        self.link.flush()
    }

    fn read_response(&mut self, opcode: Option<u8>) -> Result<Response, TransportError> {
        let timeout = self.link.config().read_timeout();
        let mut buf = [0u8; MAX_RESPONSE_LEN];
        let len = self.link.read_line(&mut buf, timeout)?;
        self.exchanges += 1;

        let response = Response::from_bytes(&buf[..len.min(buf.len())]);
        if response.is_empty() {
            warn!(
                "no reply to '{}' within {:?}",
                opcode.unwrap_or(b'?').escape_ascii(),
                timeout
            );
        } else {
            debug!("<- \"{}\"", response);
        }
        Ok(response)
    }
}
