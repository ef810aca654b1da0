//! Download record encoding
//!
//! The device prints each stored filter as 8 characters after the
//! `"Download:"` prefix. Every raw byte is shifted up by [`WIRE_OFFSET`] so
//! the line never contains control codes (0-31), which means raw values
//! above 223 cannot be represented.

use crate::filter::MAX_WIRE_VALUE;
use crate::reply::Malformed;

/// Offset added to every raw record byte on the wire
pub const WIRE_OFFSET: u8 = 32;

/// Bytes per filter record
pub const RECORD_LEN: usize = 8;

/// Decode an offset-encoded record body into raw bytes
pub fn decode_record(body: &[u8]) -> Result<[u8; RECORD_LEN], Malformed> {
    if body.len() != RECORD_LEN {
        return Err(Malformed::BadRecordLength(body.len()));
    }

    let mut raw = [0u8; RECORD_LEN];
    for (slot, &byte) in raw.iter_mut().zip(body) {
        *slot = byte
            .checked_sub(WIRE_OFFSET)
            .ok_or(Malformed::ByteBelowOffset(byte))?;
    }
    Ok(raw)
}

/// Encode raw record bytes for the wire
///
/// Returns `None` if any value is above [`MAX_WIRE_VALUE`].
pub fn encode_record(raw: &[u8; RECORD_LEN]) -> Option<[u8; RECORD_LEN]> {
    if raw.iter().any(|&v| v > MAX_WIRE_VALUE) {
        return None;
    }
    Some(raw.map(|v| v + WIRE_OFFSET))
}
