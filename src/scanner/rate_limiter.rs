//! Global pacing for outbound probes

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use super::CancelToken;

/// Token bucket with bucket size 1: completions of [`wait`](Self::wait) are
/// spaced at least `1/rate` seconds apart across all callers, which keeps the
/// outbound connect train uniform instead of bursty.
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    /// `rate` is tokens per second; 0 disables pacing entirely.
    pub fn new(rate: u64) -> Self {
        let interval = if rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / rate as f64)
        };
        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Block until the next send slot. Returns immediately once the scan is
    /// cancelled.
    pub async fn wait(&self, cancel: &CancelToken) {
        if self.interval.is_zero() || cancel.is_cancelled() {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = if *next > now { *next } else { now };
            *next = slot + self.interval;
            slot
        };

        tokio::select! {
            _ = sleep_until(slot) => {}
            _ = cancel.cancelled() => {}
        }
    }
}
