//! Protocol handler contract.
//!
//! A `ProtocolVariant` is the registered, shareable half: it claims URIs with
//! a pure `matches` check and builds a fresh `ProtocolHandler` for each job.
//! The handler runs on the job's worker and owns any connection state for the
//! duration of one transfer. The worker calls `release` exactly once after
//! `transfer` returns, errors or panics.

mod registry;

pub use registry::ProtocolRegistry;

use async_trait::async_trait;

use crate::error::TransferError;
use crate::job::Job;
use crate::outcome::Outcome;

pub trait ProtocolVariant: Send + Sync {
    /// Stable identifier used for `unregister_handler` and in logs.
    fn name(&self) -> &'static str;

    /// True if this variant can transfer `uri`. Must not perform I/O.
    fn matches(&self, uri: &str) -> bool;

    /// New handler for one job.
    fn create(&self) -> Box<dyn ProtocolHandler>;
}

impl std::fmt::Debug for dyn ProtocolVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[async_trait(?Send)]
pub trait ProtocolHandler {
    /// Full lifecycle for one job: probe, reconcile local state, transfer,
    /// verify, finalize. Returns `AlreadyComplete` without transferring when
    /// the destination already matches the remote artifact.
    async fn transfer(&mut self, job: &mut Job) -> Result<Outcome, TransferError>;

    /// Drops connection resources held by the handler.
    fn release(&mut self) {}
}

/// Lowercased scheme of `uri`, if it parses.
pub(crate) fn scheme_of(uri: &str) -> Option<String> {
    url::Url::parse(uri)
        .ok()
        .map(|u| u.scheme().to_ascii_lowercase())
}
