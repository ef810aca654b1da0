//! Commands and their acknowledgements
//!
//! Each command is one frame starting with a single opcode byte. The
//! device answers every frame with exactly one line; the expected answer
//! is fixed per command, either a literal or a literal prefix followed by
//! a value.

use core::fmt::Write;

use crate::frame::{CommandFrame, FrameError, MAX_COMMAND_LEN};
use heapless::Vec;

// Opcodes: host → device
pub const OP_NOOP: u8 = b'0';
pub const OP_HALT: u8 = b'h';
pub const OP_APPLY: u8 = b'a';
pub const OP_FILTER: u8 = b'f';
pub const OP_SET_FREQUENCY: u8 = b's';
pub const OP_GET_FREQUENCY: u8 = b'g';
pub const OP_DOWNLOAD: u8 = b'd';
pub const OP_LOAD: u8 = b'z';
pub const OP_SAVE: u8 = b'x';

// Replies: device → host
pub const ACK_NOOP: &str = "Noop";
pub const ACK_HALT: &str = "Halt";
pub const ACK_APPLY: &str = "Apply";
pub const ACK_FILTER: &str = "Filter";
pub const ACK_END_FILTERS: &str = "End filters";
pub const ACK_SET: &str = "Set";
pub const ACK_SAVED: &str = "Saved";
pub const ACK_LOADED: &str = "Loaded";
pub const PREFIX_GET: &str = "Get:";
pub const PREFIX_DOWNLOAD: &str = "Download:";

/// Sample frequency limits accepted by the device timer
pub const MIN_FREQUENCY_HZ: u32 = 1;
pub const MAX_FREQUENCY_HZ: u32 = 44_000;

/// Number of output bytes in a filter frame
pub const OUTPUT_SLOTS: usize = 2;

/// Maximum number of parameter bytes in a filter frame
pub const PARAM_SLOTS: usize = 4;

/// What the device is expected to answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Expect {
    /// The whole line must equal this literal
    Ack(&'static str),
    /// The line must start with this literal; the rest is a value
    Prefix(&'static str),
}

impl Expect {
    /// The literal text this expectation checks
    pub fn text(&self) -> &'static str {
        match self {
            Expect::Ack(s) | Expect::Prefix(s) => s,
        }
    }
}

/// Commands sent from the host to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command<'a> {
    /// Handshake; the device answers without changing state
    Noop,
    /// Stop the running chain and fall back to passthrough
    Halt,
    /// Start a chain upload of `count` filters
    BeginFilters { count: u8 },
    /// One filter record of a chain upload
    ///
    /// `outputs` is truncated to 2 entries and padded with ASCII `'0'`;
    /// `params` is truncated to 4 entries and never padded.
    Filter {
        type_id: u8,
        id: u8,
        outputs: &'a [u8],
        params: &'a [u8],
    },
    /// Finish a chain upload and start processing
    EndFilters,
    /// Set the sample frequency in Hz
    SetFrequency { hz: u16 },
    /// Read back the sample frequency
    GetFrequency,
    /// Request the chain header, then each record in turn
    Download,
    /// Load a chain from a storage block and run it
    Load { block: u8 },
    /// Save the current chain to a storage block
    Save { block: u8 },
}

impl<'a> Command<'a> {
    /// Encode this command into a padded frame
    pub fn to_frame(&self) -> Result<CommandFrame, FrameError> {
        match self {
            Command::Noop => CommandFrame::new(&[OP_NOOP]),
            Command::Halt => CommandFrame::new(&[OP_HALT]),
            Command::BeginFilters { count } => CommandFrame::new(&[OP_APPLY, *count]),
            Command::Filter {
                type_id,
                id,
                outputs,
                params,
            } => {
                // Payload: [f][type][id][out0][out1][params...]
                let mut payload = Vec::<u8, MAX_COMMAND_LEN>::new();
                payload
                    .extend_from_slice(&[OP_FILTER, *type_id, *id])
                    .map_err(|_| FrameError::PayloadTooLarge)?;

                let outputs = &outputs[..outputs.len().min(OUTPUT_SLOTS)];
                payload
                    .extend_from_slice(outputs)
                    .map_err(|_| FrameError::PayloadTooLarge)?;
                for _ in outputs.len()..OUTPUT_SLOTS {
                    payload
                        .push(b'0')
                        .map_err(|_| FrameError::PayloadTooLarge)?;
                }

                let params = &params[..params.len().min(PARAM_SLOTS)];
                payload
                    .extend_from_slice(params)
                    .map_err(|_| FrameError::PayloadTooLarge)?;

                CommandFrame::new(&payload)
            }
            Command::EndFilters => CommandFrame::new(&[OP_APPLY]),
            Command::SetFrequency { hz } => {
                // Payload: [s][decimal digits][NUL]
                let mut digits = heapless::String::<8>::new();
                write!(digits, "{}", hz).map_err(|_| FrameError::PayloadTooLarge)?;

                let mut payload = Vec::<u8, MAX_COMMAND_LEN>::new();
                payload
                    .push(OP_SET_FREQUENCY)
                    .map_err(|_| FrameError::PayloadTooLarge)?;
                payload
                    .extend_from_slice(digits.as_bytes())
                    .map_err(|_| FrameError::PayloadTooLarge)?;
                payload.push(0).map_err(|_| FrameError::PayloadTooLarge)?;

                CommandFrame::new(&payload)
            }
            Command::GetFrequency => CommandFrame::new(&[OP_GET_FREQUENCY]),
            Command::Download => CommandFrame::new(&[OP_DOWNLOAD]),
            Command::Load { block } => CommandFrame::new(&[OP_LOAD, *block]),
            Command::Save { block } => CommandFrame::new(&[OP_SAVE, *block]),
        }
    }

    /// The reply that acknowledges this command
    pub fn expected(&self) -> Expect {
        match self {
            Command::Noop => Expect::Ack(ACK_NOOP),
            Command::Halt => Expect::Ack(ACK_HALT),
            Command::BeginFilters { .. } => Expect::Ack(ACK_APPLY),
            Command::Filter { .. } => Expect::Ack(ACK_FILTER),
            Command::EndFilters => Expect::Ack(ACK_END_FILTERS),
            Command::SetFrequency { .. } => Expect::Ack(ACK_SET),
            Command::GetFrequency => Expect::Prefix(PREFIX_GET),
            Command::Download => Expect::Prefix(PREFIX_DOWNLOAD),
            Command::Load { .. } => Expect::Ack(ACK_LOADED),
            Command::Save { .. } => Expect::Ack(ACK_SAVED),
        }
    }
}
