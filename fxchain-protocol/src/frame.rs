//! Command frames and response lines
//!
//! Frame format:
//! - OPCODE (1 byte): ASCII command letter or digit
//! - PAYLOAD (0-15 bytes): command-specific bytes, sent raw
//! - PADDING: ASCII '0' up to 16 bytes total
//!
//! The firmware reads exactly 16 bytes per command, so shorter frames must
//! be padded. A payload that is already 16 bytes or longer goes out as is.
//!
//! Responses are single lines with no framing at all: whatever the device
//! printed before the line ends or the read times out.

use heapless::Vec;

/// Fixed command frame length expected by the firmware
pub const FRAME_LEN: usize = 16;

/// Byte used to pad short frames (ASCII digit zero, not NUL)
pub const FRAME_PAD: u8 = b'0';

/// Largest command the encoder accepts
pub const MAX_COMMAND_LEN: usize = 32;

/// Largest response line kept; longer lines are truncated
pub const MAX_RESPONSE_LEN: usize = 64;

/// Errors that can occur while building a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Payload exceeds the maximum command size
    PayloadTooLarge,
    /// A frame needs at least an opcode
    EmptyPayload,
}

/// An encoded command, ready to be written to the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    bytes: Vec<u8, MAX_COMMAND_LEN>,
}

impl CommandFrame {
    /// Build a frame from a raw payload (opcode first), padding it to
    /// [`FRAME_LEN`] with [`FRAME_PAD`]
    pub fn new(payload: &[u8]) -> Result<Self, FrameError> {
        if payload.is_empty() {
            return Err(FrameError::EmptyPayload);
        }

        let mut bytes = Vec::new();
        bytes
            .extend_from_slice(payload)
            .map_err(|_| FrameError::PayloadTooLarge)?;

        while bytes.len() < FRAME_LEN {
            // Capacity is above FRAME_LEN, so this cannot fail
            let _ = bytes.push(FRAME_PAD);
        }

        Ok(Self { bytes })
    }

    /// Opcode byte of this frame
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    /// Wire bytes, padding included
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total wire length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Frames always carry at least an opcode
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One response line received from the device
///
/// Kept as raw bytes: download records carry values up to 255 which are
/// not valid UTF-8 on their own.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Response {
    bytes: Vec<u8, MAX_RESPONSE_LEN>,
}

impl Response {
    /// An empty response, as produced by a read timeout
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a response from received bytes
    ///
    /// Trailing CR/LF are dropped; bytes beyond [`MAX_RESPONSE_LEN`] are
    /// discarded.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut end = data.len();
        while end > 0 && matches!(data[end - 1], b'\r' | b'\n') {
            end -= 1;
        }
        let end = end.min(MAX_RESPONSE_LEN);

        let mut bytes = Vec::new();
        // Length clamped above
        let _ = bytes.extend_from_slice(&data[..end]);
        Self { bytes }
    }

    /// Raw bytes of the line
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a timed-out read
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Exact match against an acknowledgement literal
    pub fn matches(&self, ack: &str) -> bool {
        self.bytes.as_slice() == ack.as_bytes()
    }

    /// Remainder of the line after `prefix`, if the line starts with it
    pub fn strip_prefix(&self, prefix: &str) -> Option<&[u8]> {
        self.bytes.strip_prefix(prefix.as_bytes())
    }

    /// Numeric code of a firmware `"Error: <code>"` reply
    pub fn device_error_code(&self) -> Option<u16> {
        let digits = self.strip_prefix("Error:")?.trim_ascii();
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        digits
            .iter()
            .try_fold(0u16, |acc, &d| acc.checked_mul(10)?.checked_add((d - b'0') as u16))
    }
}

impl core::fmt::Debug for Response {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Response(\"{}\")", self.bytes.escape_ascii())
    }
}

impl core::fmt::Display for Response {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.bytes.escape_ascii())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Response {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Response({=[u8]})", self.bytes.as_slice());
    }
}
