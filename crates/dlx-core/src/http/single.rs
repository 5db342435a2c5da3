//! Single-stream transfer straight into the destination, appending from the
//! current local size when the server honours ranges.

use std::path::Path;

use reqwest::header::RANGE;
use reqwest::StatusCode;
use tokio::fs::OpenOptions;

use super::client::{if_range, write_body, HttpClient};
use crate::error::TransferError;
use crate::job::Progress;
use crate::retry::{retry_async, RetryPolicy};
use crate::storage;

async fn stream_once(
    client: &HttpClient,
    url: &str,
    dest: &Path,
    total: Option<u64>,
    resumable: bool,
    validator: Option<&str>,
    progress: &Progress,
) -> Result<u64, TransferError> {
    let existing = storage::existing_len(dest).await?.unwrap_or(0);
    let resume_from = if resumable && existing > 0 { existing } else { 0 };

    let mut req = client.request(url);
    if resume_from > 0 {
        tracing::info!(path = %dest.display(), from = resume_from, "resuming stream");
        req = if_range(req.header(RANGE, format!("bytes={}-", resume_from)), validator);
    }
    let resp = client.send(req, url).await?;

    // A 200 to a ranged request carries the whole body.
    let append = resume_from > 0 && resp.status() == StatusCode::PARTIAL_CONTENT;
    let start = if append { resume_from } else { 0 };
    progress.set_bytes(start);

    let mut opts = OpenOptions::new();
    opts.create(true);
    if append {
        opts.append(true);
    } else {
        opts.write(true).truncate(true);
    }
    let mut file = opts
        .open(dest)
        .await
        .map_err(|e| TransferError::io(dest, e))?;

    let limit = total.map(|t| t.saturating_sub(start));
    let got = write_body(
        resp,
        &mut file,
        dest,
        limit,
        client.read_timeout(),
        progress,
    )
    .await?;
    let size = start + got;
    if let Some(total) = total {
        if size < total {
            return Err(TransferError::PartialTransfer {
                expected: total,
                received: size,
            });
        }
    }
    Ok(size)
}

/// Streams `url` into `dest`, retrying truncated bodies. Returns the final size.
pub async fn run_single(
    client: &HttpClient,
    url: &str,
    dest: &Path,
    total: Option<u64>,
    resumable: bool,
    validator: Option<&str>,
    policy: &RetryPolicy,
    progress: &Progress,
) -> Result<u64, TransferError> {
    let res = retry_async(policy, "stream", |_| {
        stream_once(client, url, dest, total, resumable, validator, progress)
    })
    .await;
    match res {
        Err(TransferError::PartialTransfer { expected, received }) => Err(TransferError::Integrity {
            path: dest.to_path_buf(),
            expected: format!("{} bytes", expected),
            actual: format!("{} bytes", received),
        }),
        other => other,
    }
}
