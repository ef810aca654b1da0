//! fxchain Transport Abstraction
//!
//! This crate defines the byte-channel trait the protocol client talks
//! through. The controller never touches a serial port directly; a host
//! application provides an implementation (a serial port, a simulator,
//! a test double).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application (fxchain-cli, tests)       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  fxchain-core (controller, channel)     │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  fxchain-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  SerialLink   │       │ SimulatedDev  │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`link::TransportLink`] - Duplex line-oriented byte channel

#![no_std]
#![deny(unsafe_code)]

pub mod link;

// Re-export key types at crate root for convenience
pub use link::{
    DataBits, LinkConfig, Parity, StopBits, TransportError, TransportLink, DEFAULT_BAUDRATE,
    DEFAULT_READ_TIMEOUT_MS,
};
