//! HLS engine.
//!
//! Resolves a playlist to its media segments (following the highest-bandwidth
//! variant of a variant playlist), downloads segments concurrently into
//! `<parent>/<stem>/<index>.ts` under an adaptive limiter, then concatenates
//! them in playlist order into the destination, decrypting AES-128 segments
//! on the way. The segment directory is removed only after a full merge.
//! Playlists encrypted with any other method are not merged: the downloaded
//! segments stay in their directory for the caller to decrypt.

mod decrypt;
mod playlist;
mod segment;

pub use decrypt::{decrypt_into, SegmentDecryptor};
pub use playlist::{
    iv_from_sequence, load_media, parse_iv, segments, select_variant, Encryption,
    EncryptionMethod, Segment,
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::checksum;
use crate::error::TransferError;
use crate::http::HttpClient;
use crate::job::{Job, JobOptions};
use crate::limiter::AdaptiveLimiter;
use crate::outcome::Outcome;
use crate::protocol::{scheme_of, ProtocolHandler, ProtocolVariant};
use crate::retry::retry_async;
use crate::storage;

/// Job metadata key: number of media segments.
pub const META_SEGMENTS: &str = "hls.segments";
/// Job metadata key: segment directory left in place for undecryptable playlists.
pub const META_SEGMENT_DIR: &str = "hls.segment_dir";

/// Claims `http(s)` URIs whose path ends in `.m3u8`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HlsVariant;

impl ProtocolVariant for HlsVariant {
    fn name(&self) -> &'static str {
        "hls"
    }

    fn matches(&self, uri: &str) -> bool {
        if !matches!(scheme_of(uri).as_deref(), Some("http" | "https")) {
            return false;
        }
        url::Url::parse(uri)
            .map(|u| u.path().to_ascii_lowercase().ends_with(".m3u8"))
            .unwrap_or(false)
    }

    fn create(&self) -> Box<dyn ProtocolHandler> {
        Box::new(HlsEngine::default())
    }
}

#[derive(Default)]
pub struct HlsEngine {
    client: Option<HttpClient>,
}

impl HlsEngine {
    async fn fetch_key(
        client: &HttpClient,
        key_uri: &str,
        opts: &JobOptions,
    ) -> Result<[u8; 16], TransferError> {
        let bytes = retry_async(&opts.retry, "key", |_| client.fetch_bytes(key_uri)).await?;
        <[u8; 16]>::try_from(&bytes[..]).map_err(|_| {
            TransferError::Decrypt(format!(
                "key {} is {} bytes, expected 16",
                key_uri,
                bytes.len()
            ))
        })
    }

    /// Concatenates segments in order into `dest` via a temp file.
    async fn merge(
        client: &HttpClient,
        segs: &[Segment],
        parts: &[PathBuf],
        dest: &Path,
        opts: &JobOptions,
    ) -> Result<u64, TransferError> {
        let tmp = storage::temp_path(dest);
        let mut out = File::create(&tmp)
            .await
            .map_err(|e| TransferError::io(&tmp, e))?;
        let mut keys: HashMap<String, [u8; 16]> = HashMap::new();
        let mut total = 0u64;

        for (seg, part) in segs.iter().zip(parts) {
            let aes = seg
                .encryption
                .as_ref()
                .filter(|enc| enc.method == EncryptionMethod::Aes128);
            match aes {
                Some(enc) => {
                    let key_uri = enc.key_uri.as_deref().ok_or_else(|| {
                        TransferError::Decrypt(format!("segment {} has no key URI", seg.index))
                    })?;
                    let key = match keys.get(key_uri) {
                        Some(k) => *k,
                        None => {
                            let k = Self::fetch_key(client, key_uri, opts).await?;
                            tracing::debug!(%key_uri, "fetched key");
                            keys.insert(key_uri.to_string(), k);
                            k
                        }
                    };
                    let iv = enc.iv.ok_or_else(|| {
                        TransferError::Decrypt(format!("segment {} has no IV", seg.index))
                    })?;
                    total += decrypt_into(part, &mut out, &tmp, &key, &iv).await?;
                }
                None => {
                    let mut input = File::open(part)
                        .await
                        .map_err(|e| TransferError::io(part, e))?;
                    total += tokio::io::copy(&mut input, &mut out)
                        .await
                        .map_err(|e| TransferError::io(&tmp, e))?;
                }
            }
        }

        out.flush().await.map_err(|e| TransferError::io(&tmp, e))?;
        out.sync_all().await.map_err(|e| TransferError::io(&tmp, e))?;
        drop(out);
        tokio::fs::rename(&tmp, dest)
            .await
            .map_err(|e| TransferError::io(dest, e))?;
        Ok(total)
    }
}

/// First encryption method other than AES-128 in the playlist.
fn unsupported_method(segs: &[Segment]) -> Option<&EncryptionMethod> {
    segs.iter()
        .filter_map(|s| s.encryption.as_ref())
        .map(|enc| &enc.method)
        .find(|m| **m != EncryptionMethod::Aes128)
}

#[async_trait(?Send)]
impl ProtocolHandler for HlsEngine {
    async fn transfer(&mut self, job: &mut Job) -> Result<Outcome, TransferError> {
        let dest = job.destination().to_path_buf();
        let progress = Arc::clone(job.progress());
        progress.start();

        if storage::existing_len(&dest).await?.is_some() {
            tracing::info!(path = %dest.display(), "destination exists, nothing to do");
            return Ok(Outcome::AlreadyComplete);
        }

        let client = HttpClient::new(job.options(), job.uri())?;
        self.client = Some(client.clone());
        let opts = job.options().clone();

        let (media, base) = load_media(&client, job.uri()).await?;
        let segs = segments(&media, &base)?;
        if segs.is_empty() {
            return Err(TransferError::Playlist(format!(
                "{} lists no media segments",
                job.uri()
            )));
        }
        job.set_metadata(META_SEGMENTS, segs.len().to_string());
        progress.set_piece_count(segs.len());

        let dir = storage::segment_dir(&dest);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| TransferError::io(&dir, e))?;
        let parts: Vec<PathBuf> = segs
            .iter()
            .map(|s| storage::segment_path(&dir, s.index))
            .collect();
        tracing::info!(uri = job.uri(), segments = segs.len(), dir = %dir.display(), "downloading segments");

        let limiter = AdaptiveLimiter::new(&opts.limiter);
        let results = join_all(segs.iter().zip(&parts).map(|(s, p)| {
            segment::run_segment(&client, s, p, &limiter, &opts.retry, &progress)
        }))
        .await;

        if !Outcome::all_success_like(results.iter().copied()) {
            let failed = results.iter().filter(|o| !o.is_success_like()).count();
            tracing::warn!(
                uri = job.uri(),
                failed,
                segments = segs.len(),
                "segment downloads incomplete, keeping segment directory"
            );
            return Ok(Outcome::Failure);
        }

        if let Some(method) = unsupported_method(&segs) {
            tracing::warn!(
                %method,
                dir = %dir.display(),
                "segments use an encryption method that is not decrypted automatically, leaving them unmerged"
            );
            job.set_metadata(META_SEGMENT_DIR, dir.display().to_string());
            return Ok(Outcome::Success);
        }

        let bytes = Self::merge(&client, &segs, &parts, &dest, &opts).await?;
        storage::remove_parts(&parts).await;
        if let Err(e) = tokio::fs::remove_dir(&dir).await {
            tracing::warn!(dir = %dir.display(), "could not remove segment directory: {}", e);
        }
        tracing::info!(path = %dest.display(), bytes, "merged segments");

        if let Some(expected) = &opts.expected_sha256 {
            checksum::verify_sha256(&dest, expected).await?;
        }
        Ok(Outcome::Success)
    }

    fn release(&mut self) {
        self.client = None;
    }
}
