//! Progress counters shared between a running job and its handle.
//!
//! The worker thread owns the job; the submitting side only holds an
//! `Arc<Progress>` and reads snapshots. Rate and ETA are computed from the
//! snapshot: rate = bytes_done / elapsed_secs, ETA = remaining / rate.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Live counters updated by handlers.
#[derive(Debug, Default)]
pub struct Progress {
    bytes_done: AtomicU64,
    /// 0 while unknown.
    total_bytes: AtomicU64,
    pieces_done: AtomicUsize,
    piece_count: AtomicUsize,
    started: OnceLock<Instant>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the transfer as started; later calls keep the first instant.
    pub fn start(&self) {
        let _ = self.started.set(Instant::now());
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_done.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_bytes(&self, n: u64) {
        self.bytes_done.store(n, Ordering::Relaxed);
    }

    pub fn set_total(&self, total: Option<u64>) {
        self.total_bytes.store(total.unwrap_or(0), Ordering::Relaxed);
    }

    pub fn set_piece_count(&self, n: usize) {
        self.piece_count.store(n, Ordering::Relaxed);
        self.pieces_done.store(0, Ordering::Relaxed);
    }

    pub fn piece_done(&self) {
        self.pieces_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> Option<u64> {
        match self.total_bytes.load(Ordering::Relaxed) {
            0 => None,
            n => Some(n),
        }
    }

    pub fn snapshot(&self) -> ProgressStats {
        ProgressStats {
            bytes_done: self.bytes_done(),
            total_bytes: self.total_bytes(),
            elapsed_secs: self
                .started
                .get()
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
            pieces_done: self.pieces_done.load(Ordering::Relaxed),
            piece_count: self.piece_count.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of one job's progress (CLI-friendly).
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressStats {
    /// Bytes written so far, including bytes found on disk when resuming.
    pub bytes_done: u64,
    /// Total size, when the remote reported one.
    pub total_bytes: Option<u64>,
    /// Seconds since the handler started.
    pub elapsed_secs: f64,
    /// Chunks or segments finished.
    pub pieces_done: usize,
    /// Chunks or segments planned (0 for single-stream transfers).
    pub piece_count: usize,
}

impl ProgressStats {
    /// Average rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if the total or the rate is unknown).
    pub fn eta_secs(&self) -> Option<f64> {
        let total = self.total_bytes?;
        let remaining = total.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0]. Falls back to pieces when the byte
    /// total is unknown (HLS).
    pub fn fraction(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => (self.bytes_done as f64 / total as f64).min(1.0),
            _ if self.piece_count > 0 => {
                (self.pieces_done as f64 / self.piece_count as f64).min(1.0)
            }
            _ => 0.0,
        }
    }
}
