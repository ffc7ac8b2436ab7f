//! The Link Layer Control Procedure (LLCP) engine of a BLE controller's Upper Link Layer.
//!
//! This crate drives the control-plane state machines that run on top of an established BLE
//! connection: negotiating link parameters with the peer by exchanging Link-Layer Control PDUs.
//! It does not implement the radio scheduler (Lower Link Layer), the Host/HCI layer, or the raw
//! over-the-air packet format beyond the LL Control PDU payloads defined in [`link::llcp`] --
//! those are external collaborators, referenced here only through the [`config::Config`] trait
//! and the [`link::queue::Producer`] interface.
//!
//! # Using the engine
//!
//! An application defines a [`config::Config`] naming its transmit and notification queue types,
//! then drives one [`link::procedure::Connection`] per BLE connection through
//! [`link::procedure::Engine`]'s entry points (`run`, `rx`, `submit_version_exchange`, ...) from a
//! single, non-blocking, cooperative execution context.
//!
//! [`link`]: link/index.html

#![no_std]

#[macro_use]
mod log;
#[macro_use]
mod utils;
pub mod bytes;
pub mod config;
mod error;
pub mod link;
mod pool;
pub mod time;

pub use self::error::Error;

use self::link::llcp::VersionNumber;

/// Version of the Bluetooth specification implemented by this engine.
pub const BLUETOOTH_VERSION: VersionNumber = VersionNumber::V4_2;
