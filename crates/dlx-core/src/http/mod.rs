//! Resumable HTTP(S) engine.
//!
//! Probes size and range support, reconciles an existing destination, then
//! either slices the resource into fixed-size chunks fetched concurrently
//! under an adaptive limiter, or streams it in one request (resuming with
//! `Range: bytes=N-` when possible). Chunks are merged in index order and
//! deleted only after every chunk succeeded.

mod chunk;
mod client;
mod parse;
mod probe;
mod single;
mod slice;

pub use chunk::{reconcile, ChunkState};
pub use client::HttpClient;
pub use parse::{parse_content_range, parse_headers, range_probe_accepted, ResponseMeta};
pub use probe::{probe, ProbeResult};
pub use slice::{plan_chunks, Chunk};

pub(crate) use client::write_body;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future::join_all;

use crate::checksum;
use crate::error::TransferError;
use crate::job::{Job, JobOptions, Progress};
use crate::limiter::AdaptiveLimiter;
use crate::outcome::Outcome;
use crate::protocol::{scheme_of, ProtocolHandler, ProtocolVariant};
use crate::storage;

/// Job metadata key: "true"/"false" after probing.
pub const META_RESUMABLE: &str = "http.resumable";
/// Job metadata key: "sliced" or "stream".
pub const META_MODE: &str = "http.mode";

/// Claims `http://` and `https://` URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpVariant;

impl ProtocolVariant for HttpVariant {
    fn name(&self) -> &'static str {
        "http"
    }

    fn matches(&self, uri: &str) -> bool {
        matches!(scheme_of(uri).as_deref(), Some("http" | "https"))
    }

    fn create(&self) -> Box<dyn ProtocolHandler> {
        Box::new(HttpEngine::default())
    }
}

/// Whether a resource of `total` bytes is fetched in slices. A zero
/// `slice_size` cannot partition anything and falls back to streaming.
pub fn use_slices(total: Option<u64>, resumable: bool, opts: &JobOptions) -> bool {
    match total {
        Some(total) => {
            resumable && opts.slice_size > 0 && total > opts.slice_threshold && !opts.force_stream
        }
        None => false,
    }
}

#[derive(Default)]
pub struct HttpEngine {
    client: Option<HttpClient>,
}

impl HttpEngine {
    async fn sliced(
        client: &HttpClient,
        url: &str,
        dest: &Path,
        total: u64,
        validator: Option<&str>,
        opts: &JobOptions,
        progress: &Progress,
    ) -> Result<Outcome, TransferError> {
        let chunks = plan_chunks(total, opts.slice_size, dest);
        if chunks.is_empty() {
            return Err(TransferError::InvalidState(format!(
                "no chunks planned for {} bytes with slice size {}",
                total, opts.slice_size
            )));
        }
        tracing::info!(%url, total, chunks = chunks.len(), "sliced transfer");
        progress.set_piece_count(chunks.len());

        let limiter = AdaptiveLimiter::new(&opts.limiter);
        let results = join_all(
            chunks
                .iter()
                .map(|c| {
                    chunk::run_chunk(client, url, c, validator, &limiter, &opts.retry, progress)
                }),
        )
        .await;

        if !Outcome::all_success_like(results.iter().copied()) {
            let failed = results.iter().filter(|o| !o.is_success_like()).count();
            tracing::warn!(
                %url,
                failed,
                total_chunks = chunks.len(),
                "sliced transfer incomplete, keeping chunk files"
            );
            return Ok(Outcome::Failure);
        }

        let parts: Vec<PathBuf> = chunks.iter().map(|c| c.path.clone()).collect();
        let stats = storage::merge_files(&parts, dest, Some(total)).await?;
        storage::remove_parts(&parts).await;
        tracing::info!(path = %dest.display(), parts = stats.parts, "merged chunks");
        Ok(Outcome::Success)
    }
}

#[async_trait(?Send)]
impl ProtocolHandler for HttpEngine {
    async fn transfer(&mut self, job: &mut Job) -> Result<Outcome, TransferError> {
        let client = HttpClient::new(job.options(), job.uri())?;
        self.client = Some(client.clone());
        let url = job.uri().to_string();
        let dest = job.destination().to_path_buf();
        let progress = std::sync::Arc::clone(job.progress());
        progress.start();

        let probed = probe(&client, &url).await?;
        job.set_metadata(META_RESUMABLE, probed.resumable.to_string());
        progress.set_total(probed.total);
        tracing::debug!(%url, total = ?probed.total, resumable = probed.resumable, "probed");

        if let Some(total) = probed.total {
            match storage::existing_len(&dest).await? {
                Some(n) if n == total => {
                    tracing::info!(path = %dest.display(), "destination already complete");
                    progress.set_bytes(total);
                    verify(job.options(), &dest).await?;
                    return Ok(Outcome::AlreadyComplete);
                }
                Some(n) if n > total => {
                    tracing::info!(path = %dest.display(), have = n, total, "destination larger than remote, restarting");
                    storage::remove_if_exists(&dest).await?;
                }
                _ => {}
            }
        }
        storage::ensure_parent(&dest).await?;

        let opts = job.options().clone();
        let outcome = match probed.total {
            Some(total) if use_slices(probed.total, probed.resumable, &opts) => {
                job.set_metadata(META_MODE, "sliced");
                Self::sliced(
                    &client,
                    &url,
                    &dest,
                    total,
                    probed.validator.as_deref(),
                    &opts,
                    &progress,
                )
                .await?
            }
            _ => {
                job.set_metadata(META_MODE, "stream");
                tracing::info!(%url, "stream transfer");
                single::run_single(
                    &client,
                    &url,
                    &dest,
                    probed.total,
                    probed.resumable,
                    probed.validator.as_deref(),
                    &opts.retry,
                    &progress,
                )
                .await?;
                Outcome::Success
            }
        };

        if outcome == Outcome::Success {
            verify(&opts, &dest).await?;
        }
        Ok(outcome)
    }

    fn release(&mut self) {
        self.client = None;
    }
}

async fn verify(opts: &JobOptions, dest: &Path) -> Result<(), TransferError> {
    match &opts.expected_sha256 {
        Some(expected) => checksum::verify_sha256(dest, expected).await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_variant_matches_web_schemes_only() {
        let v = HttpVariant;
        assert!(v.matches("http://example.com/a"));
        assert!(v.matches("HTTPS://example.com/a"));
        assert!(!v.matches("ftp://example.com/a"));
        assert!(!v.matches("example.com/a"));
    }

    #[test]
    fn slicing_needs_ranges_size_and_no_force() {
        let opts = JobOptions {
            slice_threshold: 1_000_000,
            ..JobOptions::default()
        };
        assert!(use_slices(Some(10_000_000), true, &opts));
        assert!(!use_slices(Some(10_000_000), false, &opts));
        assert!(!use_slices(Some(1_000_000), true, &opts));
        assert!(!use_slices(None, true, &opts));
        let forced = JobOptions {
            force_stream: true,
            ..opts.clone()
        };
        assert!(!use_slices(Some(10_000_000), true, &forced));
        let zero_slice = JobOptions {
            slice_size: 0,
            ..opts
        };
        assert!(!use_slices(Some(10_000_000), true, &zero_slice));
    }
}
