//! libcurl session for FTP and SFTP: size query, then a resumable fetch
//! into the destination. Everything here blocks; callers run it on the
//! blocking pool.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use curl::easy::Easy;

use crate::error::TransferError;
use crate::job::{Credentials, Progress};
use crate::outcome::Outcome;
use crate::retry::{classify_curl_error, retry_blocking, ErrorKind, RetryPolicy};

/// Connection parameters for one remote file.
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub url: String,
    /// Explicit credentials; `None` leaves any URI userinfo to libcurl.
    pub credentials: Option<Credentials>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub proxy: Option<String>,
    pub verify_tls: bool,
}

fn setup_err(e: curl::Error) -> TransferError {
    TransferError::Config(format!("curl: {}", e))
}

/// `CURLE_REMOTE_FILE_NOT_FOUND` (78, SFTP and FTP SIZE) or
/// `CURLE_FILE_COULDNT_READ_FILE` (37). The curl crate has no predicate for 78.
fn is_missing_remote_file(e: &curl::Error) -> bool {
    e.code() == 78 || e.is_file_couldnt_read_file()
}

pub(crate) fn map_curl_error(e: &curl::Error, url: &str) -> TransferError {
    if e.is_login_denied() || e.is_remote_access_denied() {
        return TransferError::Auth(format!("{}: {}", url, e));
    }
    if is_missing_remote_file(e) {
        return TransferError::invalid_uri(url, "remote file not found");
    }
    match classify_curl_error(e) {
        ErrorKind::Timeout => TransferError::Timeout(format!("{}: {}", url, e)),
        _ => TransferError::Connection(format!("{}: {}", url, e)),
    }
}

pub(crate) fn configure(easy: &mut Easy, t: &Target) -> Result<(), TransferError> {
    easy.url(&t.url).map_err(setup_err)?;
    easy.connect_timeout(t.connect_timeout).map_err(setup_err)?;
    if !t.read_timeout.is_zero() {
        easy.low_speed_limit(1).map_err(setup_err)?;
        easy.low_speed_time(t.read_timeout).map_err(setup_err)?;
    }
    if let Some(c) = &t.credentials {
        easy.username(&c.username).map_err(setup_err)?;
        if let Some(p) = &c.password {
            easy.password(p).map_err(setup_err)?;
        }
    }
    if let Some(p) = &t.proxy {
        easy.proxy(p).map_err(setup_err)?;
    }
    easy.ssl_verify_peer(t.verify_tls).map_err(setup_err)?;
    easy.ssl_verify_host(t.verify_tls).map_err(setup_err)?;
    Ok(())
}

/// Size as reported by the server, if it reports one.
pub(crate) fn remote_size(easy: &mut Easy, t: &Target) -> Result<Option<u64>, TransferError> {
    easy.nobody(true).map_err(setup_err)?;
    easy.resume_from(0).map_err(setup_err)?;
    easy.perform().map_err(|e| map_curl_error(&e, &t.url))?;
    let len = easy
        .content_length_download()
        .map_err(|e| map_curl_error(&e, &t.url))?;
    Ok(if len >= 0.0 { Some(len as u64) } else { None })
}

fn local_len(path: &Path) -> Result<u64, TransferError> {
    match std::fs::metadata(path) {
        Ok(m) => Ok(m.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(TransferError::io(path, e)),
    }
}

/// One attempt: appends from the current local size. Returns the final size.
pub(crate) fn fetch_once(
    easy: &mut Easy,
    t: &Target,
    dest: &Path,
    total: Option<u64>,
    progress: &Progress,
) -> Result<u64, TransferError> {
    let existing = local_len(dest)?;
    let mut opts = OpenOptions::new();
    opts.create(true);
    if existing > 0 {
        tracing::info!(path = %dest.display(), from = existing, "resuming remote transfer");
        opts.append(true);
    } else {
        opts.write(true).truncate(true);
    }
    let mut file = opts.open(dest).map_err(|e| TransferError::io(dest, e))?;
    progress.set_bytes(existing);

    easy.nobody(false).map_err(setup_err)?;
    easy.resume_from(existing).map_err(setup_err)?;

    let mut written = 0u64;
    let mut overflow = false;
    let mut write_err: Option<std::io::Error> = None;
    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                let len = data.len() as u64;
                if let Some(total) = total {
                    if existing + written + len > total {
                        overflow = true;
                        return Ok(0);
                    }
                }
                if let Err(e) = file.write_all(data) {
                    write_err = Some(e);
                    return Ok(0);
                }
                written += len;
                progress.add_bytes(len);
                Ok(data.len())
            })
            .map_err(setup_err)?;
        transfer.perform()
    };

    if let Some(e) = write_err {
        return Err(TransferError::io(dest, e));
    }
    let size = existing + written;
    if overflow {
        return Err(TransferError::Integrity {
            path: dest.to_path_buf(),
            expected: format!("{} bytes", total.unwrap_or(0)),
            actual: format!("more than {} bytes", size),
        });
    }
    performed.map_err(|e| map_curl_error(&e, &t.url))?;
    file.flush().map_err(|e| TransferError::io(dest, e))?;

    if let Some(total) = total {
        if size < total {
            return Err(TransferError::PartialTransfer {
                expected: total,
                received: size,
            });
        }
    }
    Ok(size)
}

/// Whole job on the blocking pool: size, reconcile, fetch with retries.
pub(crate) fn run(
    easy: &mut Easy,
    t: &Target,
    dest: &Path,
    policy: &RetryPolicy,
    progress: &Progress,
) -> Result<Outcome, TransferError> {
    configure(easy, t)?;
    let total = retry_blocking(policy, "size", |_| remote_size(easy, t))?;
    progress.set_total(total);
    tracing::debug!(url = %t.url, ?total, "remote size");

    if let Some(total) = total {
        let have = local_len(dest)?;
        if have == total && dest.exists() {
            tracing::info!(path = %dest.display(), "destination already complete");
            progress.set_bytes(total);
            return Ok(Outcome::AlreadyComplete);
        }
        if have > total {
            tracing::info!(path = %dest.display(), have, total, "destination larger than remote, restarting");
            std::fs::remove_file(dest).map_err(|e| TransferError::io(dest, e))?;
        }
    }

    let res = retry_blocking(policy, "remote", |_| fetch_once(easy, t, dest, total, progress));
    match res {
        Ok(size) => {
            tracing::info!(path = %dest.display(), bytes = size, "remote transfer done");
            Ok(Outcome::Success)
        }
        Err(TransferError::PartialTransfer { expected, received }) => Err(TransferError::Integrity {
            path: dest.to_path_buf(),
            expected: format!("{} bytes", expected),
            actual: format!("{} bytes", received),
        }),
        Err(e) => Err(e),
    }
}
