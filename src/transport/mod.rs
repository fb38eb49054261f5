//! Transport (spec §1: "UDP socket I/O... out of scope" for the core,
//! specified only by the contract it consumes). This module supplies that
//! contract plus concrete implementations so the crate is runnable,
//! grounded in the `async_trait`-based collaborator style of
//! `examples/vibesrc-vibemq/src/hooks/mod.rs`.

mod corrupting;
mod udp;

pub use corrupting::CorruptingTransport;
pub use udp::UdpTransport;

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::Addr;
use crate::error::TransportError;

/// Maximum MQTT-SN frame length; a single UDP datagram never fragments
/// (spec §4.B decode assumes one frame per datagram).
pub const MAX_DATAGRAM_LEN: usize = 65535;

/// UDP transport contract the gateway core depends on abstractly (spec §1).
/// Send failures are swallowed here, never surfaced to handlers (spec §7).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn recv(&self) -> Result<(Bytes, Addr), TransportError>;
    async fn send_to(&self, data: Bytes, addr: Addr);
    async fn broadcast(&self, data: Bytes, broadcast_addr: Addr);
}
