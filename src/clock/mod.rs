//! Clock & Timer service (spec §4.A)
//!
//! Monotonic time plus scheduled one-shot events with cancel, re-arm-safe.
//! This is an external collaborator by contract: the gateway core never
//! reads the wall clock or touches `tokio::time` directly, it only calls
//! `Clock::now()` and schedules through `TimerService`. This keeps the core
//! runnable against a deterministic `ManualClock` in tests (spec §8) and
//! against a real monotonic clock in production, without the core knowing
//! which one it has.

use std::time::{Duration, Instant};

use async_trait::async_trait;

mod manual;
mod monotonic;

pub use manual::{ManualClock, ManualTimerService};
pub use monotonic::{MonotonicTimerService, SystemClock};

/// Opaque handle to a scheduled timer event. Re-arm-safe: cancelling an
/// already-fired or already-cancelled handle is a no-op, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// One-shot timer scheduling, cancel-then-reschedule idempotent.
///
/// Implementations invoke `on_fire` on the same logical execution context as
/// packet handling (spec §5): a production implementation does this by
/// pushing the fired handle onto the gateway's single inbound event queue
/// rather than running arbitrary code from a timer task.
#[async_trait]
pub trait TimerService: Send + Sync {
    /// Schedule a one-shot timer `dt` from now. Returns a handle that can be
    /// cancelled. Firing enqueues `GatewayEvent::Timer(handle)`-equivalent
    /// work on the core's event source; it does not itself run a callback.
    fn schedule_after(&self, dt: Duration) -> TimerHandle;

    /// Schedule a one-shot timer at an absolute instant.
    fn schedule_at(&self, at: Instant) -> TimerHandle;

    /// Cancel a scheduled timer. Idempotent: cancelling twice, or cancelling
    /// a handle that already fired, is not an error.
    fn cancel(&self, handle: TimerHandle);

    /// Drain timers that have fired since the last poll, in a
    /// deterministic (schedule order for ties) order. The core drains this
    /// once per event-loop iteration; see `gateway::channel::run`.
    fn drain_fired(&self) -> Vec<TimerHandle>;

    /// Resolve once at least one timer has fired since the last call
    /// (or since construction). Lets `gateway::channel::run` `select!` on
    /// timers and inbound datagrams without a polling interval.
    async fn notified(&self);
}
