//! Orchestrator: variant registry, dispatch and job lifecycle.
//!
//! `submit` resolves a variant (the pinned one, or the first registered
//! variant whose `matches` accepts the URI), locks the job and hands it to
//! the worker pool. The returned `JobHandle` carries the outcome.

mod handle;
mod pool;

pub use handle::JobHandle;
pub use pool::JobResult;

use std::sync::{Arc, OnceLock};

use crate::error::TransferError;
use crate::job::{Job, JobSummary};
use crate::protocol::{ProtocolRegistry, ProtocolVariant};

use pool::{Task, WorkerPool};

/// Default number of concurrent jobs.
pub const DEFAULT_WORKERS: usize = 4;

pub struct Orchestrator {
    registry: ProtocolRegistry,
    pinned: OnceLock<Arc<dyn ProtocolVariant>>,
    pool: WorkerPool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("pinned", &self.pinned.get().map(|v| v.name()))
            .field("workers", &self.pool.workers())
            .finish()
    }
}

impl Orchestrator {
    /// Default registry, no pin, `workers` concurrent jobs.
    pub fn new(workers: usize) -> Result<Self, TransferError> {
        Self::builder().workers(workers).build()
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Adds `variant` ahead of every registered one.
    pub fn register_handler(&mut self, variant: Arc<dyn ProtocolVariant>) {
        tracing::debug!(name = variant.name(), "registered handler");
        self.registry.register(variant);
    }

    pub fn unregister_handler(&mut self, name: &str) -> Result<(), TransferError> {
        self.registry.unregister(name)?;
        tracing::debug!(name, "unregistered handler");
        Ok(())
    }

    /// Routes every later submission to `variant`. Only one pin is allowed.
    pub fn pin_handler(&self, variant: Arc<dyn ProtocolVariant>) -> Result<(), TransferError> {
        let name = variant.name();
        self.pinned.set(variant).map_err(|_| {
            TransferError::InvalidState(format!(
                "handler already pinned to {}",
                self.pinned.get().map_or("?", |v| v.name())
            ))
        })?;
        tracing::info!(name, "pinned handler");
        Ok(())
    }

    pub fn pinned(&self) -> Option<&'static str> {
        self.pinned.get().map(|v| v.name())
    }

    /// First registered variant that claims `uri`. Ignores the pin.
    pub fn match_uri(&self, uri: &str) -> Result<Arc<dyn ProtocolVariant>, TransferError> {
        self.registry
            .find(uri)
            .ok_or_else(|| TransferError::UnsupportedProtocol(uri.to_string()))
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    pub fn submit(&self, mut job: Job) -> Result<JobHandle, TransferError> {
        let variant = match self.pinned.get() {
            Some(v) => Arc::clone(v),
            None => self.match_uri(job.uri())?,
        };
        job.lock();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = JobHandle::new(
            rx,
            Arc::clone(job.progress()),
            variant.name(),
            JobSummary::from(&job),
        );
        tracing::info!(
            variant = variant.name(),
            uri = job.uri(),
            dest = %job.destination().display(),
            "job submitted"
        );
        self.pool.dispatch(Task {
            job,
            variant,
            done: tx,
        });
        Ok(handle)
    }

    /// Cancels queued jobs and detaches running workers.
    pub fn shutdown(self) {
        tracing::debug!("orchestrator shutdown");
        self.pool.close();
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.pool.close();
    }
}

#[derive(Debug)]
pub struct OrchestratorBuilder {
    workers: usize,
    registry: ProtocolRegistry,
    pinned: Option<Arc<dyn ProtocolVariant>>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            registry: ProtocolRegistry::default(),
            pinned: None,
        }
    }
}

impl OrchestratorBuilder {
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    /// Replaces the default `[hls, http, ftp, sftp]` registry.
    pub fn registry(mut self, registry: ProtocolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn register(mut self, variant: Arc<dyn ProtocolVariant>) -> Self {
        self.registry.register(variant);
        self
    }

    pub fn pinned(mut self, variant: Arc<dyn ProtocolVariant>) -> Self {
        self.pinned = Some(variant);
        self
    }

    pub fn build(self) -> Result<Orchestrator, TransferError> {
        let pinned = OnceLock::new();
        if let Some(v) = self.pinned {
            let _ = pinned.set(v);
        }
        Ok(Orchestrator {
            registry: self.registry,
            pinned,
            pool: WorkerPool::new(self.workers)?,
        })
    }
}
