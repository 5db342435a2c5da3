//! SHA-256 of finished files, computed after the transfer rather than inline.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::TransferError;

const BUF_SIZE: usize = 64 * 1024;

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute SHA-256 of a file and return the digest as lowercase hex.
pub fn sha256_path(path: &Path) -> Result<String> {
    sha256_file(path).with_context(|| format!("hash {}", path.display()))
}

/// Hashes `path` on the blocking pool and compares with `expected` (hex, any case).
pub async fn verify_sha256(path: &Path, expected: &str) -> Result<(), TransferError> {
    let owned: PathBuf = path.to_path_buf();
    let actual = tokio::task::spawn_blocking(move || sha256_file(&owned))
        .await
        .map_err(|e| TransferError::WorkerPanicked(e.to_string()))?
        .map_err(|e| TransferError::io(path, e))?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(TransferError::Integrity {
            path: path.to_path_buf(),
            expected: format!("sha256 {}", expected.trim().to_ascii_lowercase()),
            actual: format!("sha256 {}", actual),
        });
    }
    tracing::debug!(path = %path.display(), "sha256 verified");
    Ok(())
}
