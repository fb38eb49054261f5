//! Minimal internal counters.
//!
//! Spec §1 places "statistics emission" out of scope as a feature (no
//! metrics component appears in the §2 budget table), so this stays a
//! lightweight in-process counter set surfaced through `tracing` rather
//! than a Prometheus registry/HTTP endpoint — see DESIGN.md.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct GatewayMetrics {
    pub connects_accepted: AtomicU64,
    pub connects_rejected: AtomicU64,
    pub publishes_received: AtomicU64,
    pub publishes_dispatched: AtomicU64,
    pub retransmissions: AtomicU64,
    pub drops_congestion: AtomicU64,
    pub traps: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GatewayMetricsSnapshot {
        GatewayMetricsSnapshot {
            connects_accepted: self.connects_accepted.load(Ordering::Relaxed),
            connects_rejected: self.connects_rejected.load(Ordering::Relaxed),
            publishes_received: self.publishes_received.load(Ordering::Relaxed),
            publishes_dispatched: self.publishes_dispatched.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
            drops_congestion: self.drops_congestion.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayMetricsSnapshot {
    pub connects_accepted: u64,
    pub connects_rejected: u64,
    pub publishes_received: u64,
    pub publishes_dispatched: u64,
    pub retransmissions: u64,
    pub drops_congestion: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let metrics = GatewayMetrics::new();
        GatewayMetrics::inc(&metrics.publishes_received);
        GatewayMetrics::inc(&metrics.publishes_received);
        assert_eq!(metrics.snapshot().publishes_received, 2);
    }
}
