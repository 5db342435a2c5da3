//! Ordered concatenation of chunk or segment files.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{self, AsyncWriteExt};

use super::temp_path;
use crate::error::TransferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub parts: usize,
    pub bytes: u64,
}

/// Concatenates `parts` in slice order into `dest` through `<dest>.part`.
/// With `expected`, a size mismatch discards the temp file and leaves `dest`
/// untouched. The parts are left in place; see `remove_parts`.
pub async fn merge_files(
    parts: &[PathBuf],
    dest: &Path,
    expected: Option<u64>,
) -> Result<MergeStats, TransferError> {
    let tmp = temp_path(dest);
    let mut out = File::create(&tmp)
        .await
        .map_err(|e| TransferError::io(&tmp, e))?;
    let mut bytes = 0u64;
    for part in parts {
        let mut input = File::open(part)
            .await
            .map_err(|e| TransferError::io(part, e))?;
        bytes += io::copy(&mut input, &mut out)
            .await
            .map_err(|e| TransferError::io(part, e))?;
        tracing::trace!(part = %part.display(), "merged");
    }
    out.flush().await.map_err(|e| TransferError::io(&tmp, e))?;
    out.sync_all().await.map_err(|e| TransferError::io(&tmp, e))?;
    drop(out);
    if let Some(expected) = expected.filter(|&n| n != bytes) {
        if let Err(e) = fs::remove_file(&tmp).await {
            tracing::warn!(path = %tmp.display(), "could not remove temp file: {}", e);
        }
        return Err(TransferError::Integrity {
            path: dest.to_path_buf(),
            expected: format!("{} bytes", expected),
            actual: format!("{} bytes", bytes),
        });
    }
    fs::rename(&tmp, dest)
        .await
        .map_err(|e| TransferError::io(dest, e))?;
    Ok(MergeStats {
        parts: parts.len(),
        bytes,
    })
}

/// Deletes merged parts. Failures are logged, not returned: the destination is
/// already complete at this point.
pub async fn remove_parts(parts: &[PathBuf]) {
    for part in parts {
        if let Err(e) = fs::remove_file(part).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(part = %part.display(), "could not delete part: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn merge_follows_slice_order_not_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        let parts: Vec<PathBuf> = (0..3).map(|i| dir.path().join(format!("p{}", i))).collect();
        // Written out of order on purpose.
        std::fs::write(&parts[2], b"CC").unwrap();
        std::fs::write(&parts[0], b"AAA").unwrap();
        std::fs::write(&parts[1], b"B").unwrap();

        let dest = dir.path().join("out.bin");
        let stats = merge_files(&parts, &dest, Some(6)).await.unwrap();
        assert_eq!(stats, MergeStats { parts: 3, bytes: 6 });
        assert_eq!(std::fs::read(&dest).unwrap(), b"AAABCC");
        assert!(!temp_path(&dest).exists());

        remove_parts(&parts).await;
        assert!(parts.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn missing_part_fails_without_touching_dest() {
        let dir = tempfile::tempdir().unwrap();
        let parts = vec![dir.path().join("missing")];
        let dest = dir.path().join("out.bin");
        assert!(merge_files(&parts, &dest, None).await.is_err());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn size_mismatch_never_commits() {
        let dir = tempfile::tempdir().unwrap();
        let parts = vec![dir.path().join("p0")];
        std::fs::write(&parts[0], b"short").unwrap();
        let dest = dir.path().join("out.bin");

        let err = merge_files(&parts, &dest, Some(50_000)).await.unwrap_err();
        assert!(matches!(err, TransferError::Integrity { .. }));
        assert!(!dest.exists());
        assert!(!temp_path(&dest).exists());
        assert!(parts[0].exists());

        let empty = merge_files(&[], &dest, Some(50_000)).await;
        assert!(empty.is_err());
        assert!(!dest.exists());
    }
}
