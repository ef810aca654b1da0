//! Reply checking
//!
//! The device never frames its replies; the host compares each line
//! against the literal the command expects. Anything else (including an
//! empty line from a timeout) is a mismatch.

use crate::filter::FilterError;
use crate::frame::Response;
use crate::messages::{Expect, PREFIX_GET};

/// Why a well-prefixed reply could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Malformed {
    /// Expected a decimal number
    BadNumber,
    /// Download record body was not exactly 8 bytes
    BadRecordLength(usize),
    /// Download record byte below the +32 wire offset
    ByteBelowOffset(u8),
    /// Decoded record is not a valid filter
    InvalidFilter(FilterError),
    /// Device reported more filters than the client can hold
    TooManyFilters(u32),
}

impl core::fmt::Display for Malformed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Malformed::BadNumber => write!(f, "expected a decimal number"),
            Malformed::BadRecordLength(len) => {
                write!(f, "download record has {} bytes, expected 8", len)
            }
            Malformed::ByteBelowOffset(b) => {
                write!(f, "record byte 0x{:02x} is below the wire offset", b)
            }
            Malformed::InvalidFilter(e) => write!(f, "invalid filter record: {:?}", e),
            Malformed::TooManyFilters(n) => write!(f, "device reported {} filters", n),
        }
    }
}

/// A reply that does not acknowledge the command it answers
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReplyError {
    /// Reply text differs from the expected literal or prefix
    Mismatch {
        expected: &'static str,
        received: Response,
    },
    /// Prefix matched but the value behind it is unusable
    Malformed(Malformed),
    /// A reply was offered to a sequence with no command outstanding
    Unsolicited,
}

impl From<Malformed> for ReplyError {
    fn from(e: Malformed) -> Self {
        ReplyError::Malformed(e)
    }
}

/// Require an exact acknowledgement
pub fn expect_ack(response: &Response, ack: &'static str) -> Result<(), ReplyError> {
    if response.matches(ack) {
        Ok(())
    } else {
        Err(ReplyError::Mismatch {
            expected: ack,
            received: response.clone(),
        })
    }
}

/// Require a prefix and return the value bytes after it
pub fn expect_prefix<'r>(
    response: &'r Response,
    prefix: &'static str,
) -> Result<&'r [u8], ReplyError> {
    response.strip_prefix(prefix).ok_or_else(|| ReplyError::Mismatch {
        expected: prefix,
        received: response.clone(),
    })
}

/// Check a reply against an [`Expect`], returning the value part
pub fn check<'r>(response: &'r Response, expect: Expect) -> Result<&'r [u8], ReplyError> {
    match expect {
        Expect::Ack(ack) => expect_ack(response, ack).map(|_| &[][..]),
        Expect::Prefix(prefix) => expect_prefix(response, prefix),
    }
}

/// Parse unsigned decimal ASCII, tolerating surrounding whitespace
pub fn parse_decimal(digits: &[u8]) -> Result<u32, Malformed> {
    let digits = digits.trim_ascii();
    if digits.is_empty() {
        return Err(Malformed::BadNumber);
    }

    let mut value: u32 = 0;
    for &d in digits {
        if !d.is_ascii_digit() {
            return Err(Malformed::BadNumber);
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((d - b'0') as u32))
            .ok_or(Malformed::BadNumber)?;
    }
    Ok(value)
}

/// Decode a `"Get:<hz>"` reply
pub fn parse_frequency(response: &Response) -> Result<u32, ReplyError> {
    let digits = expect_prefix(response, PREFIX_GET)?;
    Ok(parse_decimal(digits)?)
}
