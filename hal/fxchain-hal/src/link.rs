//! Duplex byte channel abstraction
//!
//! Provides the blocking, line-oriented transport trait that the command
//! channel drives. Implementations wrap a physical serial port or a
//! simulated device.

use core::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Baud rate the device firmware configures its UART for
pub const DEFAULT_BAUDRATE: u32 = 9600;

/// Per-read timeout used when waiting for a response line
pub const DEFAULT_READ_TIMEOUT_MS: u32 = 100;

/// Errors from transport operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Operation requires an open link
    NotOpen,
    /// The link could not be opened
    Open,
    /// The link could not be closed
    Close,
    /// Writing or flushing failed
    Write,
    /// Reading failed (a plain timeout is not an error)
    Read,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            TransportError::NotOpen => "link is not open",
            TransportError::Open => "failed to open link",
            TransportError::Close => "failed to close link",
            TransportError::Write => "write to link failed",
            TransportError::Read => "read from link failed",
        };
        f.write_str(msg)
    }
}

/// Duplex byte channel to the device
///
/// The channel is strictly half-duplex request/response from the
/// caller's point of view: one write, then one bounded read. Nothing is
/// retried and nothing is buffered beyond what the underlying channel
/// does on its own.
pub trait TransportLink {
    /// Open the physical connection
    fn open(&mut self) -> Result<(), TransportError>;

    /// Close the physical connection
    fn close(&mut self) -> Result<(), TransportError>;

    /// Write all bytes to the link
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Flush any buffered outgoing data
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Read one line into `buf`
    ///
    /// Reads until a line terminator (`\n`) is seen, `buf` is full, or
    /// `timeout` elapses. The terminator is not stored. Returns the number
    /// of bytes placed in `buf`; a silent timeout returns `Ok(0)`.
    fn read_line(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Check whether the physical connection is open
    fn is_open(&self) -> bool;

    /// Link settings this transport was created with
    fn config(&self) -> &LinkConfig;
}

/// Serial link configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LinkConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
    /// Number of data bits (typically 8)
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
    /// How long a single response read may block, in milliseconds
    pub read_timeout_ms: u32,
}

impl LinkConfig {
    /// Per-read timeout as a `Duration`
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms as u64)
    }

    /// Override the baud rate
    pub fn with_baudrate(mut self, baudrate: u32) -> Self {
        self.baudrate = baudrate;
        self
    }

    /// Override the per-read timeout
    pub fn with_read_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.read_timeout_ms = timeout_ms;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baudrate: DEFAULT_BAUDRATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DataBits {
    Seven,
    Eight,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StopBits {
    One,
    Two,
}
