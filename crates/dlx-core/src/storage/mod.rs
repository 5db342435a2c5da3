//! On-disk layout of partial artifacts and the ordered merge.
//!
//! Sliced HTTP transfers keep one file per chunk next to the destination
//! (`movie.mkv.0.slice`, `movie.mkv.1.slice`, ...). HLS segments live in a
//! sibling directory named after the destination's stem (`movie/0.ts`).
//! Merges write `<dest>.part` and rename it over the destination, so the
//! destination is either absent or complete.

mod merge;

pub use merge::{merge_files, remove_parts, MergeStats};

use std::path::{Path, PathBuf};

use crate::error::TransferError;

/// Suffix of the merge target before its atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Appends `.part` to the final path (e.g. `file.iso` -> `file.iso.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Chunk file for slice `index` of `dest`: `<dest>.<index>.slice`.
pub fn chunk_path(dest: &Path, index: usize) -> PathBuf {
    let mut o = dest.as_os_str().to_owned();
    o.push(format!(".{}.slice", index));
    PathBuf::from(o)
}

/// Segment directory for an HLS destination: `<parent>/<stem>/`.
pub fn segment_dir(dest: &Path) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "segments".into());
    match dest.parent() {
        Some(parent) => parent.join(stem),
        None => PathBuf::from(stem),
    }
}

/// `<dir>/<index>.ts`
pub fn segment_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{}.ts", index))
}

/// Size of an existing file, `None` if it does not exist.
pub async fn existing_len(path: &Path) -> Result<Option<u64>, TransferError> {
    match tokio::fs::metadata(path).await {
        Ok(m) => Ok(Some(m.len())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TransferError::io(path, e)),
    }
}

/// Removes a file, ignoring "not found".
pub async fn remove_if_exists(path: &Path) -> Result<(), TransferError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TransferError::io(path, e)),
    }
}

/// Creates the parent directory of `path` if needed.
pub async fn ensure_parent(path: &Path) -> Result<(), TransferError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| TransferError::io(parent, e))?;
    }
    Ok(())
}
