//! Ceiling arithmetic: sliding sample window plus AIMD adjustment.
//!
//! Pure state, no locking; `AdaptiveLimiter` wraps it in a mutex.

use std::collections::VecDeque;
use std::time::Duration;

use crate::config::LimiterConfig;

#[derive(Debug, Clone, Copy)]
struct Sample {
    latency: Option<Duration>,
}

/// What the last `adapt` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Decreased { from: usize, to: usize },
    Increased { from: usize, to: usize },
    Unchanged,
}

#[derive(Debug)]
pub(super) struct CeilingState {
    ceiling: usize,
    max: usize,
    window: VecDeque<Sample>,
    window_len: usize,
    decrease_factor: f64,
    increase_step: usize,
    increase_after: usize,
    latency_factor: f64,
    /// Failure or latency regression seen since the last adapt.
    degraded: bool,
    /// Consecutive healthy samples since the last change.
    healthy_run: usize,
}

impl CeilingState {
    pub(super) fn new(cfg: &LimiterConfig) -> Self {
        let max = cfg.max.max(1);
        Self {
            ceiling: cfg.initial.clamp(1, max),
            max,
            window: VecDeque::with_capacity(cfg.window.max(1)),
            window_len: cfg.window.max(1),
            decrease_factor: cfg.decrease_factor,
            increase_step: cfg.increase_step.max(1),
            increase_after: cfg.increase_after.max(1),
            latency_factor: cfg.latency_factor,
            degraded: false,
            healthy_run: 0,
        }
    }

    pub(super) fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub(super) fn max(&self) -> usize {
        self.max
    }

    /// Mean latency of samples currently in the window that carry one.
    fn baseline(&self) -> Option<Duration> {
        let mut sum = Duration::ZERO;
        let mut n = 0u32;
        for s in &self.window {
            if let Some(l) = s.latency {
                sum += l;
                n += 1;
            }
        }
        if n < 2 {
            return None;
        }
        Some(sum / n)
    }

    pub(super) fn record(&mut self, success: bool, latency: Option<Duration>) {
        let regression = match (latency, self.baseline()) {
            (Some(l), Some(base)) => l.as_secs_f64() > base.as_secs_f64() * self.latency_factor,
            _ => false,
        };
        self.window.push_back(Sample { latency });
        while self.window.len() > self.window_len {
            self.window.pop_front();
        }
        if !success || regression {
            self.degraded = true;
            self.healthy_run = 0;
        } else {
            self.healthy_run += 1;
        }
    }

    pub(super) fn adapt(&mut self) -> Adjustment {
        let from = self.ceiling;
        if self.degraded {
            self.degraded = false;
            self.healthy_run = 0;
            let scaled = (from as f64 * self.decrease_factor).floor() as usize;
            // A factor >= 1.0 must still shrink the ceiling.
            let to = scaled.min(from.saturating_sub(1)).max(1);
            self.ceiling = to;
            return if to < from {
                Adjustment::Decreased { from, to }
            } else {
                Adjustment::Unchanged
            };
        }
        if self.healthy_run >= self.increase_after {
            self.healthy_run = 0;
            let to = from.saturating_add(self.increase_step).min(self.max);
            self.ceiling = to;
            if to > from {
                return Adjustment::Increased { from, to };
            }
        }
        Adjustment::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(initial: usize, max: usize) -> LimiterConfig {
        LimiterConfig {
            initial,
            max,
            window: 8,
            decrease_factor: 0.5,
            increase_step: 1,
            increase_after: 3,
            latency_factor: 2.0,
        }
    }

    const MS: Duration = Duration::from_millis(10);

    #[test]
    fn initial_is_clamped() {
        assert_eq!(CeilingState::new(&cfg(0, 4)).ceiling(), 1);
        assert_eq!(CeilingState::new(&cfg(10, 4)).ceiling(), 4);
        assert_eq!(CeilingState::new(&cfg(3, 0)).max(), 1);
    }

    #[test]
    fn failure_halves_ceiling() {
        let mut s = CeilingState::new(&cfg(8, 16));
        s.record(false, None);
        assert_eq!(s.adapt(), Adjustment::Decreased { from: 8, to: 4 });
    }

    #[test]
    fn never_below_one() {
        let mut s = CeilingState::new(&cfg(1, 16));
        for _ in 0..5 {
            s.record(false, None);
            s.adapt();
        }
        assert_eq!(s.ceiling(), 1);
    }

    #[test]
    fn sustained_success_increases_up_to_max() {
        let mut s = CeilingState::new(&cfg(2, 3));
        for _ in 0..3 {
            s.record(true, Some(MS));
        }
        assert_eq!(s.adapt(), Adjustment::Increased { from: 2, to: 3 });
        for _ in 0..3 {
            s.record(true, Some(MS));
        }
        assert_eq!(s.adapt(), Adjustment::Unchanged);
        assert_eq!(s.ceiling(), 3);
    }

    #[test]
    fn failure_among_successes_never_increases() {
        let mut s = CeilingState::new(&cfg(4, 16));
        for _ in 0..10 {
            s.record(true, Some(MS));
        }
        s.record(false, Some(MS));
        assert!(matches!(s.adapt(), Adjustment::Decreased { .. }));
        assert!(s.ceiling() < 4);
    }

    #[test]
    fn latency_regression_decreases() {
        let mut s = CeilingState::new(&cfg(4, 16));
        s.record(true, Some(MS));
        s.record(true, Some(MS));
        s.adapt();
        s.record(true, Some(MS * 10));
        assert_eq!(s.adapt(), Adjustment::Decreased { from: 4, to: 2 });
    }

    #[test]
    fn factor_above_one_still_decreases() {
        let mut c = cfg(4, 16);
        c.decrease_factor = 1.5;
        let mut s = CeilingState::new(&c);
        s.record(false, None);
        assert_eq!(s.adapt(), Adjustment::Decreased { from: 4, to: 3 });
    }

    #[test]
    fn ceiling_stays_in_bounds_under_mixed_samples() {
        let mut s = CeilingState::new(&cfg(5, 7));
        for i in 0..200u64 {
            let ok = i % 7 != 0;
            s.record(ok, Some(Duration::from_millis(5 + (i % 13))));
            s.adapt();
            assert!(s.ceiling() >= 1 && s.ceiling() <= 7);
        }
    }
}
