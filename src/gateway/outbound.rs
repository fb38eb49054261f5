//! Outbound work items produced by the core, consumed by the transport edge.

use crate::codec::{Addr, Packet};

#[derive(Debug, Clone)]
pub enum Outbound {
    Unicast(Addr, Packet),
    Broadcast(Packet),
}
