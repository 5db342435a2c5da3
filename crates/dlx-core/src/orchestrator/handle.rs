use std::sync::Arc;

use tokio::sync::oneshot;

use super::pool::JobResult;
use crate::error::TransferError;
use crate::job::{JobSummary, Progress, ProgressStats};

/// Caller's side of a submitted job.
pub struct JobHandle {
    rx: oneshot::Receiver<JobResult>,
    progress: Arc<Progress>,
    variant: &'static str,
    job: JobSummary,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("variant", &self.variant)
            .field("job", &self.job)
            .finish()
    }
}

impl JobHandle {
    pub(crate) fn new(
        rx: oneshot::Receiver<JobResult>,
        progress: Arc<Progress>,
        variant: &'static str,
        job: JobSummary,
    ) -> Self {
        Self {
            rx,
            progress,
            variant,
            job,
        }
    }

    /// Resolves once the job has finished, failed or been cancelled.
    pub async fn wait(self) -> JobResult {
        self.rx.await.unwrap_or(Err(TransferError::Cancelled))
    }

    /// Blocking `wait`. Must not be called from inside an async runtime.
    pub fn wait_blocking(self) -> JobResult {
        self.rx.blocking_recv().unwrap_or(Err(TransferError::Cancelled))
    }

    /// Non-blocking check: `Some` once the job has settled.
    pub fn try_outcome(&mut self) -> Option<JobResult> {
        match self.rx.try_recv() {
            Ok(res) => Some(res),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TransferError::Cancelled)),
        }
    }

    pub fn progress(&self) -> ProgressStats {
        self.progress.snapshot()
    }

    /// Name of the variant that was pinned or matched for this job.
    pub fn variant(&self) -> &'static str {
        self.variant
    }

    pub fn job(&self) -> &JobSummary {
        &self.job
    }
}
