//! Packet codec (spec §4.B)
//!
//! Defines the decoded-struct set the gateway core operates on, plus a
//! concrete MQTT-SN v1.2 wire codec so the crate is runnable end to end.
//! The core (`gateway::core`) only ever depends on `codec::packet`; the byte
//! layout in `codec::wire` is consumed exclusively by the transport-facing
//! edge (`gateway::router`), preserving the "core operates on decoded
//! structs" boundary from spec §1.

mod error;
mod packet;
mod wire;

pub use error::{DecodeError, EncodeError};
pub use packet::*;
pub use wire::{decode, encode};
