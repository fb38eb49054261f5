//! Deterministic clock/timer test double (spec §8 "testable properties").

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Clock, TimerHandle, TimerService};

/// A clock whose `now()` only advances when `advance` is called. Lets tests
/// script keep-alive expiry, retransmission sweeps, and awake-drain budgets
/// without sleeping.
pub struct ManualClock {
    epoch: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, dt: Duration) {
        let mut offset = self.offset.lock();
        *offset += dt;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.epoch + *self.offset.lock()
    }
}

/// Timer service paired with `ManualClock`: timers fire once `drain_fired`
/// is called after the clock has advanced past their deadline.
pub struct ManualTimerService<'c> {
    clock: &'c ManualClock,
    next_id: AtomicU64,
    // deadline -> handle ids scheduled for that deadline, preserving
    // schedule order within a tie (spec: "deterministic, implementation
    // defined order" for same-time ticks).
    pending: Mutex<BTreeMap<Instant, Vec<u64>>>,
    cancelled: Mutex<std::collections::HashSet<u64>>,
}

impl<'c> ManualTimerService<'c> {
    pub fn new(clock: &'c ManualClock) -> Self {
        Self {
            clock,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(BTreeMap::new()),
            cancelled: Mutex::new(std::collections::HashSet::new()),
        }
    }
}

#[async_trait]
impl TimerService for ManualTimerService<'_> {
    fn schedule_after(&self, dt: Duration) -> TimerHandle {
        self.schedule_at(self.clock.now() + dt)
    }

    fn schedule_at(&self, at: Instant) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().entry(at).or_default().push(id);
        TimerHandle::from_raw(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        self.cancelled.lock().insert(handle.0);
    }

    fn drain_fired(&self) -> Vec<TimerHandle> {
        let now = self.clock.now();
        let mut pending = self.pending.lock();
        let mut cancelled = self.cancelled.lock();
        let mut fired = Vec::new();

        let due: Vec<Instant> = pending.range(..=now).map(|(k, _)| *k).collect();
        for deadline in due {
            if let Some(ids) = pending.remove(&deadline) {
                for id in ids {
                    if !cancelled.remove(&id) {
                        fired.push(TimerHandle::from_raw(id));
                    }
                }
            }
        }
        fired
    }

    /// Tests drive `ManualClock`/`ManualTimerService` by calling `advance`
    /// then `drain_fired` directly, never through `gateway::channel::run`,
    /// so there is nothing to await here.
    async fn notified(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_fires_only_after_advance() {
        let clock = ManualClock::new();
        let timers = ManualTimerService::new(&clock);
        let handle = timers.schedule_after(Duration::from_secs(5));
        assert!(timers.drain_fired().is_empty());
        clock.advance(Duration::from_secs(5));
        let fired = timers.drain_fired();
        assert_eq!(fired, vec![handle]);
        // draining again yields nothing: a fired timer does not re-fire.
        assert!(timers.drain_fired().is_empty());
    }

    #[test]
    fn cancel_is_idempotent_and_rearm_safe() {
        let clock = ManualClock::new();
        let timers = ManualTimerService::new(&clock);
        let handle = timers.schedule_after(Duration::from_secs(1));
        timers.cancel(handle);
        timers.cancel(handle); // second cancel is a no-op, not an error
        clock.advance(Duration::from_secs(1));
        assert!(timers.drain_fired().is_empty());

        // re-arming after cancel schedules a fresh, independent timer
        let rearmed = timers.schedule_after(Duration::from_secs(1));
        clock.advance(Duration::from_secs(1));
        assert_eq!(timers.drain_fired(), vec![rearmed]);
    }
}
