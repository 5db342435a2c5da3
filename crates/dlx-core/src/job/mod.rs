//! A transfer request: source URI, destination path and options.
//!
//! Jobs are freely editable until submitted. `Orchestrator::submit` locks the
//! job, after which uri, destination and options setters return
//! `TransferError::JobLocked`. The metadata map stays writable so handlers can
//! stash private flags (e.g. whether the server honoured ranges).

mod options;
mod progress;

pub use options::{Credentials, JobOptions};
pub use progress::{Progress, ProgressStats};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::TransferError;

#[derive(Debug)]
pub struct Job {
    uri: String,
    destination: PathBuf,
    options: JobOptions,
    progress: Arc<Progress>,
    metadata: HashMap<String, String>,
    locked: bool,
}

impl Job {
    pub fn new(uri: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            uri: uri.into(),
            destination: destination.into(),
            options: JobOptions::default(),
            progress: Arc::new(Progress::new()),
            metadata: HashMap::new(),
            locked: false,
        }
    }

    /// Builder-style options setter for freshly created jobs.
    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    pub fn progress(&self) -> &Arc<Progress> {
        &self.progress
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_uri(&mut self, uri: impl Into<String>) -> Result<(), TransferError> {
        self.ensure_unlocked()?;
        self.uri = uri.into();
        Ok(())
    }

    pub fn set_destination(&mut self, path: impl Into<PathBuf>) -> Result<(), TransferError> {
        self.ensure_unlocked()?;
        self.destination = path.into();
        Ok(())
    }

    pub fn set_options(&mut self, options: JobOptions) -> Result<(), TransferError> {
        self.ensure_unlocked()?;
        self.options = options;
        Ok(())
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub(crate) fn lock(&mut self) {
        self.locked = true;
    }

    fn ensure_unlocked(&self) -> Result<(), TransferError> {
        if self.locked {
            return Err(TransferError::JobLocked);
        }
        Ok(())
    }
}

/// Immutable description of a submitted job, kept by its handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub uri: String,
    pub destination: PathBuf,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            uri: job.uri.clone(),
            destination: job.destination.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_work_until_locked() {
        let mut job = Job::new("http://example.com/a.bin", "/tmp/a.bin");
        job.set_uri("http://example.com/b.bin").unwrap();
        job.set_destination("/tmp/b.bin").unwrap();
        assert_eq!(job.uri(), "http://example.com/b.bin");

        job.lock();
        assert!(matches!(
            job.set_uri("http://example.com/c.bin"),
            Err(TransferError::JobLocked)
        ));
        assert!(matches!(
            job.set_options(JobOptions::default()),
            Err(TransferError::JobLocked)
        ));
        assert_eq!(job.destination(), Path::new("/tmp/b.bin"));
    }

    #[test]
    fn metadata_stays_writable_after_lock() {
        let mut job = Job::new("http://example.com/a.bin", "/tmp/a.bin");
        job.lock();
        job.set_metadata("resumable", "true");
        assert_eq!(job.metadata("resumable"), Some("true"));
    }

    #[test]
    fn progress_is_shared() {
        let job = Job::new("http://example.com/a.bin", "/tmp/a.bin");
        let observer = Arc::clone(job.progress());
        job.progress().add_bytes(42);
        assert_eq!(observer.bytes_done(), 42);
    }
}
