//! Adaptive concurrency limiter.
//!
//! One limiter gates the chunk or segment tasks of a single job. Each task
//! acquires a permit, does its network work, then calls `finish` on the
//! permit, which records the outcome and re-evaluates the ceiling before the
//! permit is released. A lowered ceiling only affects later `acquire` calls;
//! permits already handed out are never revoked.

mod window;

pub use window::Adjustment;

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::config::LimiterConfig;
use window::CeilingState;

#[derive(Debug)]
struct Inner {
    ceiling: CeilingState,
    in_flight: usize,
}

#[derive(Debug)]
pub struct AdaptiveLimiter {
    inner: Mutex<Inner>,
    released: Notify,
}

impl AdaptiveLimiter {
    pub fn new(cfg: &LimiterConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ceiling: CeilingState::new(cfg),
                in_flight: 0,
            }),
            released: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current permit ceiling, always in `[1, max]`.
    pub fn ceiling(&self) -> usize {
        self.lock().ceiling.ceiling()
    }

    pub fn max(&self) -> usize {
        self.lock().ceiling.max()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Waits until fewer than `ceiling` permits are out, then takes one.
    pub async fn acquire(&self) -> LimiterPermit<'_> {
        loop {
            // Registered before the check so a release in between is not missed.
            let released = self.released.notified();
            {
                let mut inner = self.lock();
                if inner.in_flight < inner.ceiling.ceiling() {
                    inner.in_flight += 1;
                    return LimiterPermit {
                        limiter: self,
                        acquired_at: Instant::now(),
                    };
                }
            }
            released.await;
        }
    }

    /// Non-blocking acquire.
    pub fn try_acquire(&self) -> Option<LimiterPermit<'_>> {
        let mut inner = self.lock();
        if inner.in_flight < inner.ceiling.ceiling() {
            inner.in_flight += 1;
            return Some(LimiterPermit {
                limiter: self,
                acquired_at: Instant::now(),
            });
        }
        None
    }

    /// Adds one completed sub-transfer to the window.
    pub fn record(&self, success: bool, latency: Option<Duration>) {
        self.lock().ceiling.record(success, latency);
    }

    /// Re-evaluates the ceiling from samples recorded so far.
    pub fn adapt(&self) -> Adjustment {
        let adjustment = self.lock().ceiling.adapt();
        match adjustment {
            Adjustment::Decreased { from, to } => {
                tracing::debug!(from, to, "limiter ceiling decreased");
            }
            Adjustment::Increased { from, to } => {
                tracing::debug!(from, to, "limiter ceiling increased");
                self.released.notify_waiters();
            }
            Adjustment::Unchanged => {}
        }
        adjustment
    }

    fn release(&self) {
        {
            let mut inner = self.lock();
            inner.in_flight = inner.in_flight.saturating_sub(1);
        }
        self.released.notify_waiters();
    }
}

/// Scoped admission; dropping it releases the slot.
#[derive(Debug)]
#[must_use = "dropping the permit releases it immediately"]
pub struct LimiterPermit<'a> {
    limiter: &'a AdaptiveLimiter,
    acquired_at: Instant,
}

impl LimiterPermit<'_> {
    pub fn elapsed(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Records the outcome with the time since acquire as latency, adapts,
    /// then releases.
    pub fn finish(self, success: bool) -> Adjustment {
        self.limiter.record(success, Some(self.elapsed()));
        self.limiter.adapt()
    }

    /// Like `finish` but without a latency sample (nothing was transferred).
    pub fn finish_idle(self, success: bool) -> Adjustment {
        self.limiter.record(success, None);
        self.limiter.adapt()
    }
}

impl Drop for LimiterPermit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
