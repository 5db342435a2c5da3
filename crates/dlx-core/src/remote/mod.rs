//! FTP and SFTP handlers backed by libcurl.
//!
//! Both query the remote size first, skip the transfer when the destination
//! already has that size, restart when it is larger, and otherwise resume from
//! the local size. The curl handle lives on the handler until `release`.

mod session;

use std::sync::Arc;

use async_trait::async_trait;
use curl::easy::Easy;

use crate::checksum;
use crate::error::TransferError;
use crate::job::{Credentials, Job};
use crate::outcome::Outcome;
use crate::protocol::{scheme_of, ProtocolHandler, ProtocolVariant};
use crate::storage;

use session::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteKind {
    Ftp,
    Sftp,
}

/// Claims `ftp://` and `ftps://` URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FtpVariant;

impl ProtocolVariant for FtpVariant {
    fn name(&self) -> &'static str {
        "ftp"
    }

    fn matches(&self, uri: &str) -> bool {
        matches!(scheme_of(uri).as_deref(), Some("ftp" | "ftps"))
    }

    fn create(&self) -> Box<dyn ProtocolHandler> {
        Box::new(RemoteEngine::new(RemoteKind::Ftp))
    }
}

/// Claims `sftp://` URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SftpVariant;

impl ProtocolVariant for SftpVariant {
    fn name(&self) -> &'static str {
        "sftp"
    }

    fn matches(&self, uri: &str) -> bool {
        scheme_of(uri).as_deref() == Some("sftp")
    }

    fn create(&self) -> Box<dyn ProtocolHandler> {
        Box::new(RemoteEngine::new(RemoteKind::Sftp))
    }
}

pub struct RemoteEngine {
    kind: RemoteKind,
    session: Option<Easy>,
}

impl RemoteEngine {
    fn new(kind: RemoteKind) -> Self {
        Self {
            kind,
            session: None,
        }
    }
}

/// Builds the connection target. Explicit credentials win; FTP without any
/// falls back to anonymous login.
fn target_for(job: &Job, kind: RemoteKind) -> Result<Target, TransferError> {
    let url = url::Url::parse(job.uri()).map_err(|e| TransferError::invalid_uri(job.uri(), e.to_string()))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(TransferError::invalid_uri(job.uri(), "missing host"));
    }
    let opts = job.options();
    let credentials = match (&opts.auth, kind) {
        (Some(c), _) => Some(c.clone()),
        (None, RemoteKind::Ftp) if url.username().is_empty() => {
            Some(Credentials::new("anonymous", Some("anonymous@".to_string())))
        }
        (None, _) => None,
    };
    Ok(Target {
        url: job.uri().to_string(),
        credentials,
        connect_timeout: opts.connect_timeout,
        read_timeout: opts.read_timeout,
        proxy: opts.proxy.clone(),
        verify_tls: opts.verify_tls,
    })
}

#[async_trait(?Send)]
impl ProtocolHandler for RemoteEngine {
    async fn transfer(&mut self, job: &mut Job) -> Result<Outcome, TransferError> {
        let target = target_for(job, self.kind)?;
        let dest = job.destination().to_path_buf();
        let progress = Arc::clone(job.progress());
        progress.start();
        storage::ensure_parent(&dest).await?;

        let policy = job.options().retry.clone();
        let easy = self.session.take().unwrap_or_else(Easy::new);
        let blocking_dest = dest.clone();
        let (easy, res) = tokio::task::spawn_blocking(move || {
            let mut easy = easy;
            let res = session::run(&mut easy, &target, &blocking_dest, &policy, &progress);
            (easy, res)
        })
        .await
        .map_err(|e| TransferError::WorkerPanicked(e.to_string()))?;
        self.session = Some(easy);

        let outcome = res?;
        if let Some(expected) = &job.options().expected_sha256 {
            checksum::verify_sha256(&dest, expected).await?;
        }
        Ok(outcome)
    }

    fn release(&mut self) {
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobOptions;

    #[test]
    fn variants_claim_their_schemes() {
        assert!(FtpVariant.matches("ftp://mirror.example.com/pub/a.iso"));
        assert!(FtpVariant.matches("FTPS://mirror.example.com/pub/a.iso"));
        assert!(!FtpVariant.matches("sftp://host/a"));
        assert!(SftpVariant.matches("sftp://host/home/u/a"));
        assert!(!SftpVariant.matches("https://host/a"));
    }

    #[test]
    fn ftp_defaults_to_anonymous() {
        let job = Job::new("ftp://mirror.example.com/pub/a.iso", "/tmp/a.iso");
        let t = target_for(&job, RemoteKind::Ftp).unwrap();
        let c = t.credentials.unwrap();
        assert_eq!(c.username, "anonymous");
        assert_eq!(c.password.as_deref(), Some("anonymous@"));
    }

    #[test]
    fn uri_userinfo_is_left_to_curl() {
        let job = Job::new("ftp://bob:pw@mirror.example.com/a", "/tmp/a");
        assert!(target_for(&job, RemoteKind::Ftp).unwrap().credentials.is_none());
        let job = Job::new("sftp://host/a", "/tmp/a");
        assert!(target_for(&job, RemoteKind::Sftp).unwrap().credentials.is_none());
    }

    #[test]
    fn explicit_credentials_win() {
        let opts = JobOptions {
            auth: Some(Credentials::new("alice", Some("secret".into()))),
            ..JobOptions::default()
        };
        let job = Job::new("sftp://bob@host/a", "/tmp/a").with_options(opts);
        let t = target_for(&job, RemoteKind::Sftp).unwrap();
        assert_eq!(t.credentials.unwrap().username, "alice");
    }

    #[test]
    fn missing_host_is_invalid() {
        let job = Job::new("ftp:///pub/a", "/tmp/a");
        assert!(matches!(
            target_for(&job, RemoteKind::Ftp),
            Err(TransferError::InvalidUri { .. })
        ));
    }
}
