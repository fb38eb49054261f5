//! Production timer service backed by `tokio::time`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant as TokioInstant;

use super::{Clock, TimerHandle, TimerService};

/// `Clock` backed by `std::time::Instant`/`tokio::time`, for production use.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Timer service that schedules real `tokio::time::sleep` tasks, each of
/// which — on fire — sends its handle into a channel the core loop selects
/// on alongside inbound datagrams. This is what keeps timer firing on "the
/// same logical execution context as packet handling" (spec §4.A/§5): the
/// sleep tasks themselves run no gateway logic, they only enqueue a handle.
pub struct MonotonicTimerService {
    next_id: AtomicU64,
    cancelled: Mutex<HashSet<u64>>,
    fired_tx: mpsc::UnboundedSender<TimerHandle>,
    fired_rx: Mutex<mpsc::UnboundedReceiver<TimerHandle>>,
    notify: Arc<Notify>,
}

impl MonotonicTimerService {
    pub fn new() -> Self {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        Self {
            next_id: AtomicU64::new(1),
            cancelled: Mutex::new(HashSet::new()),
            fired_tx,
            fired_rx: Mutex::new(fired_rx),
            notify: Arc::new(Notify::new()),
        }
    }

    fn spawn(&self, at: Instant, id: u64) {
        let tx = self.fired_tx.clone();
        let notify = self.notify.clone();
        let deadline = TokioInstant::from_std(at);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(TimerHandle::from_raw(id));
            notify.notify_one();
        });
    }
}

impl Default for MonotonicTimerService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimerService for MonotonicTimerService {
    fn schedule_after(&self, dt: Duration) -> TimerHandle {
        self.schedule_at(Instant::now() + dt)
    }

    fn schedule_at(&self, at: Instant) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.spawn(at, id);
        TimerHandle::from_raw(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        self.cancelled.lock().insert(handle.0);
    }

    fn drain_fired(&self) -> Vec<TimerHandle> {
        let mut rx = self.fired_rx.lock();
        let mut cancelled = self.cancelled.lock();
        let mut fired = Vec::new();
        while let Ok(handle) = rx.try_recv() {
            if !cancelled.remove(&handle.0) {
                fired.push(handle);
            }
        }
        fired
    }

    async fn notified(&self) {
        self.notify.notified().await;
    }
}
