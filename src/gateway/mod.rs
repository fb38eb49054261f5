//! Gateway core (spec §4.B/F/G/I/K/L/M/N): owns every table and runs the
//! single-threaded packet/timer event loop (spec §5).
//!
//! Split the way `examples/vibesrc-vibemq/src/broker/mod.rs` splits its
//! broker: a `core` module holding state plus the packet router, a
//! `timers` module holding the periodic sweep/lifecycle orchestration, and
//! a `channel` module wiring both to the async transport/timer edges.

mod channel;
mod core;
mod outbound;
mod timers;

pub use channel::run;
pub use core::GatewayCore;
pub use outbound::Outbound;
pub use timers::{TimerPurpose, TimerRequest};

/// `GatewayState` (spec §3, §4.N).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Offline,
    Online,
}
