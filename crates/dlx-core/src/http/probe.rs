//! Remote metadata probing: size, range capability and resume validator.

use reqwest::header::RANGE;

use super::client::HttpClient;
use super::parse::{self, ResponseMeta};
use crate::error::TransferError;

/// What the engine needs to pick a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total size, if the server reported one.
    pub total: Option<u64>,
    /// True if byte ranges can be requested.
    pub resumable: bool,
    /// Sent as `If-Range` on resumed requests so a changed remote restarts.
    pub validator: Option<String>,
}

/// HEAD first; if that fails or is refused, a streamed request whose body is never read.
pub async fn fetch_meta(client: &HttpClient, url: &str) -> Result<ResponseMeta, TransferError> {
    match client.send(client.head(url), url).await {
        Ok(resp) => return Ok(parse::parse_headers(resp.headers())),
        Err(e) => tracing::debug!(%url, "HEAD failed, probing with a streamed request: {}", e),
    }
    let resp = client.send(client.request(url), url).await?;
    Ok(parse::parse_headers(resp.headers()))
}

/// `Range: bytes=0-1` probe. `None` when the request itself failed.
pub async fn probe_range(client: &HttpClient, url: &str) -> Option<ResponseMeta> {
    match client
        .send(client.request(url).header(RANGE, "bytes=0-1"), url)
        .await
    {
        Ok(resp) => Some(parse::parse_headers(resp.headers())),
        Err(e) => {
            tracing::warn!(%url, "range probe failed, treating as non-resumable: {}", e);
            None
        }
    }
}

/// Merges the first response with an optional range probe. A zero
/// `Content-Length` counts as unknown; the probe's `Content-Range` total
/// fills it in.
pub fn combine(meta: &ResponseMeta, ranged: Option<&ResponseMeta>) -> ProbeResult {
    let mut total = meta.content_length.filter(|&n| n > 0);
    let mut resumable = meta.accept_ranges;
    if let Some(r) = ranged {
        resumable |= parse::range_probe_accepted(r);
        if total.is_none() {
            total = r.range_total();
        }
    }
    ProbeResult {
        total,
        resumable,
        validator: meta
            .validator()
            .or_else(|| ranged.and_then(ResponseMeta::validator)),
    }
}

pub async fn probe(client: &HttpClient, url: &str) -> Result<ProbeResult, TransferError> {
    let meta = fetch_meta(client, url).await?;
    let needs_range_probe = !meta.accept_ranges || meta.content_length.unwrap_or(0) == 0;
    let ranged = if needs_range_probe {
        probe_range(client, url).await
    } else {
        None
    };
    Ok(combine(&meta, ranged.as_ref()))
}
