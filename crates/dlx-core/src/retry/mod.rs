//! Retry and backoff policy.
//!
//! Error classification (timeouts, throttling, connection failures, truncated
//! bodies) and exponential backoff decisions shared by the HTTP chunk tasks,
//! HLS segment tasks and the FTP/SFTP handlers.

mod classify;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{retry_async, retry_blocking};
