//! One chunk of a sliced transfer: reconcile the chunk file, then fetch the
//! missing tail of its range.

use reqwest::header::RANGE;
use reqwest::StatusCode;
use tokio::fs::OpenOptions;

use super::client::{if_range, write_body, HttpClient};
use super::slice::Chunk;
use crate::error::TransferError;
use crate::job::Progress;
use crate::limiter::AdaptiveLimiter;
use crate::outcome::Outcome;
use crate::retry::{retry_async, RetryPolicy};
use crate::storage;

/// What was found on disk for a chunk before any request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Complete,
    /// Resume after this many bytes (0 = fresh).
    Resume(u64),
    /// Larger than the range; must be deleted.
    Oversize,
}

/// Decide from the local size alone.
pub fn reconcile(existing: Option<u64>, chunk: &Chunk) -> ChunkState {
    match existing {
        None => ChunkState::Resume(0),
        Some(n) if n == chunk.len() => ChunkState::Complete,
        Some(n) if n > chunk.len() => ChunkState::Oversize,
        Some(n) => ChunkState::Resume(n),
    }
}

enum Fetched {
    AlreadyThere,
    Transferred,
}

async fn fetch_once(
    client: &HttpClient,
    url: &str,
    chunk: &Chunk,
    validator: Option<&str>,
    progress: &Progress,
    first_attempt: bool,
) -> Result<Fetched, TransferError> {
    let existing = storage::existing_len(&chunk.path).await?;
    let have = match reconcile(existing, chunk) {
        ChunkState::Complete => {
            if first_attempt {
                tracing::debug!(index = chunk.index, "chunk already complete");
                progress.add_bytes(chunk.len());
            }
            return Ok(Fetched::AlreadyThere);
        }
        ChunkState::Oversize => {
            tracing::info!(index = chunk.index, "chunk larger than its range, restarting");
            storage::remove_if_exists(&chunk.path).await?;
            0
        }
        ChunkState::Resume(n) => {
            if n > 0 && first_attempt {
                tracing::debug!(index = chunk.index, have = n, "resuming chunk");
                progress.add_bytes(n);
            }
            n
        }
    };

    // Every chunk carries the validator so all slices come from one version.
    let req = if_range(
        client.request(url).header(RANGE, chunk.range_header_value(have)),
        validator,
    );
    let resp = client.send(req, url).await?;
    if resp.status() != StatusCode::PARTIAL_CONTENT {
        let actual = if resp.status() == StatusCode::OK && validator.is_some() {
            "200 OK (remote changed since probe)".to_string()
        } else {
            resp.status().to_string()
        };
        return Err(TransferError::Integrity {
            path: chunk.path.clone(),
            expected: "206 Partial Content".to_string(),
            actual,
        });
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&chunk.path)
        .await
        .map_err(|e| TransferError::io(&chunk.path, e))?;
    let want = chunk.len() - have;
    let got = write_body(
        resp,
        &mut file,
        &chunk.path,
        Some(want),
        client.read_timeout(),
        progress,
    )
    .await?;
    if got < want {
        return Err(TransferError::PartialTransfer {
            expected: want,
            received: got,
        });
    }
    Ok(Fetched::Transferred)
}

/// Runs one chunk under a limiter permit. Every attempt feeds the limiter;
/// the permit is released only after the final record and adapt.
pub async fn run_chunk(
    client: &HttpClient,
    url: &str,
    chunk: &Chunk,
    validator: Option<&str>,
    limiter: &AdaptiveLimiter,
    policy: &RetryPolicy,
    progress: &Progress,
) -> Outcome {
    let permit = limiter.acquire().await;
    let label = format!("chunk {}", chunk.index);
    let res = retry_async(policy, &label, |attempt| async move {
        let res = fetch_once(client, url, chunk, validator, progress, attempt == 1).await;
        if res.is_err() {
            limiter.record(false, None);
            limiter.adapt();
        }
        res
    })
    .await;

    match res {
        Ok(Fetched::AlreadyThere) => {
            permit.finish_idle(true);
            progress.piece_done();
            Outcome::AlreadyComplete
        }
        Ok(Fetched::Transferred) => {
            permit.finish(true);
            progress.piece_done();
            tracing::debug!(index = chunk.index, "chunk done");
            Outcome::Success
        }
        Err(e) => {
            // Failures were already recorded per attempt.
            drop(permit);
            tracing::warn!(index = chunk.index, %url, "chunk failed: {}", e);
            Outcome::Failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn chunk(start: u64, end: u64) -> Chunk {
        Chunk {
            index: 0,
            start,
            end,
            path: PathBuf::from("x.0.slice"),
        }
    }

    #[test]
    fn reconcile_rules() {
        let c = chunk(0, 99);
        assert_eq!(reconcile(None, &c), ChunkState::Resume(0));
        assert_eq!(reconcile(Some(0), &c), ChunkState::Resume(0));
        assert_eq!(reconcile(Some(40), &c), ChunkState::Resume(40));
        assert_eq!(reconcile(Some(100), &c), ChunkState::Complete);
        assert_eq!(reconcile(Some(101), &c), ChunkState::Oversize);
    }

    #[test]
    fn short_last_chunk_uses_its_own_length() {
        let last = chunk(8_000_000, 9_999_999);
        assert_eq!(reconcile(Some(2_000_000), &last), ChunkState::Complete);
        assert_eq!(reconcile(Some(4_000_000), &last), ChunkState::Oversize);
    }
}
