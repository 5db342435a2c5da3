//! Classify HTTP statuses, client errors and `TransferError`s into retry kinds.

use crate::error::TransferError;
use crate::retry::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled(None),
        500..=599 => ErrorKind::Http5xx(code),
        _ => ErrorKind::Other,
    }
}

/// Classify a curl error (FTP/SFTP transfers).
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Classify a job-level error.
pub fn classify(e: &TransferError) -> ErrorKind {
    match e {
        TransferError::Timeout(_) => ErrorKind::Timeout,
        TransferError::Connection(_) => ErrorKind::Connection,
        TransferError::PartialTransfer { .. } => ErrorKind::Truncated,
        TransferError::HttpStatus {
            status,
            retry_after,
            ..
        } => match classify_http_status(*status) {
            ErrorKind::Throttled(_) => ErrorKind::Throttled(*retry_after),
            kind => kind,
        },
        _ => ErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn http_429_and_503_throttled() {
        assert_eq!(classify_http_status(429), ErrorKind::Throttled(None));
        assert_eq!(classify_http_status(503), ErrorKind::Throttled(None));
    }

    #[test]
    fn http_5xx_retryable() {
        assert!(matches!(classify_http_status(500), ErrorKind::Http5xx(500)));
        assert!(matches!(classify_http_status(502), ErrorKind::Http5xx(502)));
    }

    #[test]
    fn http_4xx_other() {
        assert_eq!(classify_http_status(404), ErrorKind::Other);
        assert_eq!(classify_http_status(403), ErrorKind::Other);
    }

    #[test]
    fn transfer_errors() {
        assert_eq!(
            classify(&TransferError::Timeout("read".into())),
            ErrorKind::Timeout
        );
        assert_eq!(
            classify(&TransferError::PartialTransfer {
                expected: 10,
                received: 4
            }),
            ErrorKind::Truncated
        );
        assert_eq!(
            classify(&TransferError::HttpStatus {
                status: 503,
                url: String::new(),
                retry_after: Some(Duration::from_secs(3)),
            }),
            ErrorKind::Throttled(Some(Duration::from_secs(3)))
        );
        assert_eq!(
            classify(&TransferError::HttpStatus {
                status: 502,
                url: String::new(),
                retry_after: Some(Duration::from_secs(3)),
            }),
            ErrorKind::Http5xx(502)
        );
        assert_eq!(
            classify(&TransferError::Integrity {
                path: PathBuf::from("x"),
                expected: "1".into(),
                actual: "2".into()
            }),
            ErrorKind::Other
        );
    }
}
