//! Protocol client for the fxchain filter-chain audio unit
//!
//! This crate drives the device over any [`TransportLink`]:
//!
//! - [`channel`] - one padded frame out, one response line back
//! - [`controller`] - connect, halt, apply, frequency, download, save/load
//! - [`session`] - connection state machine and last error
//! - [`chain`] - caller-side editable filter chain
//! - [`sim`] - in-process device simulator (`std` feature)
//!
//! Nothing here retries. A command whose reply does not match is reported
//! to the caller and the device is left as it is.
//!
//! [`TransportLink`]: fxchain_hal::TransportLink

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

pub mod chain;
pub mod channel;
pub mod controller;
pub mod error;
pub mod session;
#[cfg(any(test, feature = "std"))]
pub mod sim;

pub use chain::{ChainError, FilterChain};
pub use channel::CommandChannel;
pub use controller::{DeviceController, StorageBlock};
pub use error::{ControllerError, RangeError};
pub use session::{DeviceSession, Event, State};
#[cfg(any(test, feature = "std"))]
pub use sim::SimulatedDevice;
