//! Worker threads that run one job at a time each.
//!
//! Every job gets a fresh current-thread runtime on its worker, so a job's
//! chunk or segment futures interleave cooperatively and never share a
//! runtime with another job. Panics are caught per job.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use tokio::sync::oneshot;

use crate::error::TransferError;
use crate::job::Job;
use crate::outcome::Outcome;
use crate::protocol::ProtocolVariant;

/// What a `JobHandle` resolves to.
pub type JobResult = Result<Outcome, TransferError>;

pub(crate) struct Task {
    pub job: Job,
    pub variant: Arc<dyn ProtocolVariant>,
    pub done: oneshot::Sender<JobResult>,
}

#[derive(Default)]
struct Queue {
    tasks: VecDeque<Task>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        // A poisoned queue still holds valid tasks.
        self.queue.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub(crate) struct WorkerPool {
    shared: Arc<Shared>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, TransferError> {
        let workers = workers.max(1);
        let shared = Arc::new(Shared::default());
        for i in 0..workers {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("dlx-worker-{}", i))
                .spawn(move || worker_loop(&shared))
                .map_err(|e| TransferError::InvalidState(format!("cannot spawn worker: {}", e)))?;
        }
        tracing::debug!(workers, "worker pool started");
        Ok(Self { shared, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queues a task. After `close`, the task is answered with `Cancelled`.
    pub fn dispatch(&self, task: Task) {
        let mut q = self.shared.lock();
        if q.closed {
            drop(q);
            let _ = task.done.send(Err(TransferError::Cancelled));
            return;
        }
        q.tasks.push_back(task);
        drop(q);
        self.shared.ready.notify_one();
    }

    /// Stops workers from taking new tasks and cancels queued ones. Running
    /// jobs finish on their own threads. Idempotent.
    pub fn close(&self) {
        let drained: Vec<Task> = {
            let mut q = self.shared.lock();
            if q.closed {
                return;
            }
            q.closed = true;
            q.tasks.drain(..).collect()
        };
        self.shared.ready.notify_all();
        if !drained.is_empty() {
            tracing::info!(cancelled = drained.len(), "cancelling queued jobs");
        }
        for task in drained {
            let _ = task.done.send(Err(TransferError::Cancelled));
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut q = shared.lock();
            loop {
                if q.closed {
                    return;
                }
                if let Some(t) = q.tasks.pop_front() {
                    break t;
                }
                q = shared.ready.wait(q).unwrap_or_else(|p| p.into_inner());
            }
        };
        run_task(task);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_task(task: Task) {
    let Task {
        mut job,
        variant,
        done,
    } = task;
    let name = variant.name();
    let uri = job.uri().to_string();

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = done.send(Err(TransferError::InvalidState(format!(
                "cannot start job runtime: {}",
                e
            ))));
            return;
        }
    };

    tracing::debug!(variant = name, %uri, "job started");
    let mut handler = variant.create();
    let res = catch_unwind(AssertUnwindSafe(|| rt.block_on(handler.transfer(&mut job))));
    if catch_unwind(AssertUnwindSafe(|| handler.release())).is_err() {
        tracing::warn!(variant = name, %uri, "handler panicked during release");
    }
    drop(handler);
    drop(rt);

    let res = match res {
        Ok(r) => r.map(Outcome::settled),
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            tracing::error!(variant = name, %uri, "job panicked: {}", msg);
            Err(TransferError::WorkerPanicked(msg))
        }
    };
    match &res {
        Ok(outcome) => tracing::info!(variant = name, %uri, %outcome, "job finished"),
        Err(e) => tracing::warn!(variant = name, %uri, "job failed: {}", e),
    }
    // The receiver may already be gone; the job ran regardless.
    let _ = done.send(res);
}
