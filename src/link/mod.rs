//! Link Layer Control Procedure support.
//!
//! This module implements the control-plane machinery that runs on top of an already-established
//! BLE connection: the dispatcher and procedure state machines that negotiate link parameters with
//! the peer by exchanging [`llcp`] control PDUs. It does not implement the rest of the Link Layer
//! (advertising, connection establishment, the data-channel transport, CRC/whitening) -- those are
//! external collaborators referenced only through the [`queue::Producer`] interface and
//! [`crate::config::Config`].
//!
//! # Data Channel PDU header
//!
//! The procedure engine only ever hands off encoded LL Control PDU *payloads*; framing them into a
//! data channel PDU is the collaborator's job. For reference, a data channel PDU header looks like
//! this:
//!
//! ```notrust
//! LSB                                                                MSB
//! +----------+---------+---------+---------+------------+--------------+
//! |   LLID   |  NESN   |   SN    |   MD    |     -      |    Length    |
//! | (2 bits) | (1 bit) | (1 bit) | (1 bit) |  (3 bits)  |   (8 bits)   |
//! +----------+---------+---------+---------+------------+--------------+
//! ```
//!
//! The 2-bit `LLID` field (see [`queue::Llid`]) distinguishes an LL Control PDU (`0b11`) from data
//! PDUs. All multi-byte fields in control PDU payloads are little-endian.

mod comp_id;
mod features;
pub mod llcp;
pub mod procedure;
pub mod queue;

pub use self::comp_id::*;
pub use self::features::*;
