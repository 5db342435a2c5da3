//! Error type shared by every protocol handler and the orchestrator.
//!
//! Capability probes never surface these directly: a failed range probe just
//! clears the resumable flag. Errors here describe why a job (or one of its
//! pieces) could not complete.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Network-level failure (DNS, refused, reset, TLS).
    #[error("connection error: {0}")]
    Connection(String),
    /// Connect or read deadline expired.
    #[error("timed out: {0}")]
    Timeout(String),
    /// Server rejected the supplied credentials.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// No registered variant claims the URI.
    #[error("no protocol handler for {0}")]
    UnsupportedProtocol(String),
    /// URI could not be parsed or lacks a required part.
    #[error("invalid uri {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },
    /// Final artifact does not match what the remote advertised.
    #[error("integrity check failed for {path}: expected {expected}, got {actual}")]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    /// A ranged body ended before the requested bytes arrived.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// Non-success HTTP status. `retry_after` is the server's `Retry-After` hint.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        status: u16,
        url: String,
        retry_after: Option<Duration>,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("playlist error: {0}")]
    Playlist(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
    /// Option value that cannot be applied (bad header, proxy, key length).
    #[error("configuration error: {0}")]
    Config(String),
    /// Operation not allowed in the current orchestrator or job state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Job fields are immutable once submitted.
    #[error("job is locked after submission")]
    JobLocked,
    /// Job was still queued when the orchestrator shut down.
    #[error("job cancelled before it started")]
    Cancelled,
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),
}

impl TransferError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        TransferError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn invalid_uri(uri: &str, reason: impl Into<String>) -> Self {
        TransferError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return TransferError::HttpStatus {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
                retry_after: None,
            };
        }
        if e.is_timeout() {
            TransferError::Timeout(e.to_string())
        } else {
            TransferError::Connection(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
