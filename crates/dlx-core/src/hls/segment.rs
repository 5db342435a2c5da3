//! Fetching one media segment into the segment directory.

use std::path::Path;

use tokio::fs::OpenOptions;

use super::playlist::Segment;
use crate::error::TransferError;
use crate::http::{parse_headers, write_body, HttpClient};
use crate::job::Progress;
use crate::limiter::AdaptiveLimiter;
use crate::outcome::Outcome;
use crate::retry::{retry_async, RetryPolicy};
use crate::storage;

enum Fetched {
    AlreadyThere,
    Transferred,
}

async fn fetch_once(
    client: &HttpClient,
    segment: &Segment,
    path: &Path,
    progress: &Progress,
) -> Result<Fetched, TransferError> {
    let resp = client.send(client.get(&segment.uri), &segment.uri).await?;
    let remote = parse_headers(resp.headers()).content_length;

    // A local file matching the advertised length is kept; the body is never read.
    let local = storage::existing_len(path).await?;
    if let (Some(local), Some(remote)) = (local, remote) {
        if local == remote {
            tracing::debug!(index = segment.index, bytes = local, "segment already present");
            progress.add_bytes(local);
            return Ok(Fetched::AlreadyThere);
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|e| TransferError::io(path, e))?;
    let got = write_body(resp, &mut file, path, remote, client.read_timeout(), progress).await?;
    if let Some(remote) = remote {
        if got < remote {
            return Err(TransferError::PartialTransfer {
                expected: remote,
                received: got,
            });
        }
    }
    Ok(Fetched::Transferred)
}

/// Downloads `segment` to `path` under a limiter permit.
pub async fn run_segment(
    client: &HttpClient,
    segment: &Segment,
    path: &Path,
    limiter: &AdaptiveLimiter,
    policy: &RetryPolicy,
    progress: &Progress,
) -> Outcome {
    let permit = limiter.acquire().await;
    let label = format!("segment {}", segment.index);
    let res = retry_async(policy, &label, |_| async move {
        let res = fetch_once(client, segment, path, progress).await;
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
            Outcome::Success
        }
        Err(e) => {
            drop(permit);
            tracing::warn!(index = segment.index, uri = %segment.uri, "segment failed: {}", e);
            Outcome::Failure
        }
    }
}
