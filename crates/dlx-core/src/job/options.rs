//! Per-job transfer options.

use std::time::Duration;

use crate::config::LimiterConfig;
use crate::retry::RetryPolicy;

/// Username and optional password for HTTP basic auth, FTP or SFTP.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Knobs a caller can set per job. `DlxConfig::job_options()` gives the
/// configured defaults.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub connect_timeout: Duration,
    /// Maximum idle time between two body reads.
    pub read_timeout: Duration,
    /// Extra request headers (HTTP and HLS only).
    pub headers: Vec<(String, String)>,
    /// Sent as one `Cookie` header on every HTTP and HLS request.
    pub cookies: Vec<(String, String)>,
    /// Method of the HTTP requests for the job URI (probe fallback, range
    /// probe, chunks, stream). HEAD probes and HLS fetches are unaffected.
    pub method: String,
    /// Body sent with every request that uses `method`.
    pub body: Option<Vec<u8>>,
    /// Query pairs appended to the job URI (HTTP engine only).
    pub query: Vec<(String, String)>,
    /// Overrides credentials embedded in the URI.
    pub auth: Option<Credentials>,
    pub proxy: Option<String>,
    pub verify_tls: bool,
    pub user_agent: Option<String>,
    /// Resources strictly larger than this are sliced when resumable.
    pub slice_threshold: u64,
    pub slice_size: u64,
    /// Never slice, even when the server supports ranges.
    pub force_stream: bool,
    pub limiter: LimiterConfig,
    pub retry: RetryPolicy,
    /// Lowercase hex SHA-256 the finished file must match.
    pub expected_sha256: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(30),
            headers: Vec::new(),
            cookies: Vec::new(),
            method: "GET".to_string(),
            body: None,
            query: Vec::new(),
            auth: None,
            proxy: None,
            verify_tls: true,
            user_agent: None,
            slice_threshold: 16 * 1024 * 1024,
            slice_size: 8 * 1024 * 1024,
            force_stream: false,
            limiter: LimiterConfig::default(),
            retry: RetryPolicy::default(),
            expected_sha256: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let c = Credentials::new("alice", Some("hunter2".to_string()));
        let s = format!("{:?}", c);
        assert!(s.contains("alice"));
        assert!(!s.contains("hunter2"));
    }
}
