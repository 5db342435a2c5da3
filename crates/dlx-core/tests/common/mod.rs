#![allow(dead_code)]

pub mod range_server;

use std::time::Duration;

use dlx_core::job::JobOptions;
use dlx_core::retry::RetryPolicy;

/// Options with short timeouts and near-instant retries.
pub fn fast_options() -> JobOptions {
    JobOptions {
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            jitter: false,
        },
        ..JobOptions::default()
    }
}

/// Deterministic test payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}
