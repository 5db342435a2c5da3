//! Backoff decisions for chunk, segment, key and remote-file retries.

use std::time::Duration;

use rand::Rng;

/// Why an attempt failed, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect or read deadline expired.
    Timeout,
    /// 429 or 503, with the server's `Retry-After` when it sent one.
    Throttled(Option<Duration>),
    /// Reset, refused, DNS.
    Connection,
    /// Body ended early; the next attempt resumes from what was written.
    Truncated,
    Http5xx(u16),
    /// Anything else. Never retried.
    Other,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        !matches!(self, ErrorKind::Other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Capped exponential backoff. A throttling server's `Retry-After` replaces
/// the computed delay, still capped at `max_delay`. Built from `[retry]` in
/// config.toml via `RetryPolicy::from(&RetryConfig)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per piece, the first included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Adds a random `[0, base_delay / 2)` to each backoff, never past `max_delay`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based), before jitter:
    /// `base_delay * 2^(attempt - 1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        self.base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn with_jitter(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let span = (self.base_delay / 2).min(self.max_delay.saturating_sub(delay));
        let span_ms = u64::try_from(span.as_millis()).unwrap_or(u64::MAX);
        if span_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::rng().random_range(0..span_ms))
    }

    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts || !kind.is_transient() {
            return RetryDecision::NoRetry;
        }
        let delay = match kind {
            ErrorKind::Throttled(Some(hint)) => hint.min(self.max_delay),
            _ => self.with_jitter(self.backoff(attempt)),
        };
        RetryDecision::RetryAfter(delay)
    }
}
