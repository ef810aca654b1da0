//! fxchain Serial Command Protocol
//!
//! This crate defines the command/response protocol between a host and the
//! filter-chain audio unit, plus the codec that moves filter chains across
//! it. Everything here is pure data transformation; the I/O loop lives in
//! `fxchain-core`.
//!
//! # Protocol Overview
//!
//! Every command is a fixed 16-byte frame, right-padded with ASCII `'0'`:
//! ```text
//! ┌────────┬─────────────────────┬──────────────────┐
//! │ OPCODE │ PAYLOAD             │ PADDING ('0')    │
//! │ 1B     │ 0–15B               │ to 16B total     │
//! └────────┴─────────────────────┴──────────────────┘
//! ```
//!
//! The device answers each frame with one line of text (`"Noop"`,
//! `"Filter"`, `"Get:44000"`...). Raw byte values in download records are
//! shifted up by 32 so they never collide with ASCII control codes.
//!
//! Exactly one command is in flight at a time. Multi-frame operations
//! (apply, download) are modelled as explicit state machines in
//! [`sequence`].

#![no_std]
#![deny(unsafe_code)]

pub mod filter;
pub mod frame;
pub mod messages;
pub mod record;
pub mod reply;
pub mod sequence;

pub use filter::{
    parse_byte_list, FilterDefinition, FilterError, FilterKind, FilterList, MAX_FILTERS,
    MAX_WIRE_VALUE,
};
pub use frame::{CommandFrame, FrameError, Response, FRAME_LEN, FRAME_PAD, MAX_RESPONSE_LEN};
pub use messages::{Command, Expect};
pub use record::{decode_record, encode_record, RECORD_LEN, WIRE_OFFSET};
pub use reply::{Malformed, ReplyError};
pub use sequence::{ApplySequence, ApplyStep, DownloadSequence, DownloadStep, TooManyFilters};
