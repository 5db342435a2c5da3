//! Retry loop: run an async operation until success or policy says stop.

use std::future::Future;

use super::classify;
use super::policy::{RetryDecision, RetryPolicy};
use crate::error::TransferError;

/// Runs `f` until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
/// `label` only appears in log lines.
pub async fn retry_async<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut f: F,
) -> Result<T, TransferError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(
                            %label,
                            attempt,
                            ?kind,
                            delay_ms = d.as_millis() as u64,
                            "retrying: {}",
                            e
                        );
                        tokio::time::sleep(d).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}

/// Blocking variant for libcurl transfers running on the blocking pool.
pub fn retry_blocking<T, F>(policy: &RetryPolicy, label: &str, mut f: F) -> Result<T, TransferError>
where
    F: FnMut(u32) -> Result<T, TransferError>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(%label, attempt, ?kind, "retrying: {}", e);
                        std::thread::sleep(d);
                        attempt += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
        }
    }

    #[tokio::test]
    async fn retries_connection_errors_until_success() {
        let calls = Cell::new(0u32);
        let out = retry_async(&fast_policy(5), "t", |attempt| {
            calls.set(calls.get() + 1);
            async move {
                if attempt < 3 {
                    Err(TransferError::Connection("reset".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn does_not_retry_other_errors() {
        let calls = Cell::new(0u32);
        let res: Result<(), _> = retry_async(&fast_policy(5), "t", |_| {
            calls.set(calls.get() + 1);
            async { Err(TransferError::Auth("denied".into())) }
        })
        .await;
        assert!(matches!(res, Err(TransferError::Auth(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn blocking_gives_up_after_max_attempts() {
        let mut calls = 0;
        let res: Result<(), _> = retry_blocking(&fast_policy(3), "t", |_| {
            calls += 1;
            Err(TransferError::Timeout("slow".into()))
        });
        assert!(matches!(res, Err(TransferError::Timeout(_))));
        assert_eq!(calls, 3);
    }
}
