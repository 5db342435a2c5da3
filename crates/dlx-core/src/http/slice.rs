//! Chunk type and fixed-size range planning.

use std::path::{Path, PathBuf};

use crate::storage::chunk_path;

/// One slice of the remote resource: inclusive byte range `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    /// First byte (inclusive).
    pub start: u64,
    /// Last byte (inclusive).
    pub end: u64,
    /// Local file holding this chunk's bytes.
    pub path: PathBuf,
}

impl Chunk {
    /// Length of this chunk in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// HTTP Range header value resuming after `have` bytes: `bytes=(start+have)-end`.
    pub fn range_header_value(&self, have: u64) -> String {
        format!("bytes={}-{}", self.start + have, self.end)
    }
}

/// Partitions `[0, total)` into `slice_size` ranges; the last one may be shorter.
/// Returns an empty vec if `total` or `slice_size` is 0.
pub fn plan_chunks(total: u64, slice_size: u64, dest: &Path) -> Vec<Chunk> {
    if total == 0 || slice_size == 0 {
        return Vec::new();
    }
    let count = total.div_ceil(slice_size) as usize;
    let mut out = Vec::with_capacity(count);
    let mut start = 0u64;
    let mut index = 0usize;
    while start < total {
        let end = (start + slice_size).min(total) - 1;
        out.push(Chunk {
            index,
            start,
            end,
            path: chunk_path(dest, index),
        });
        start = end + 1;
        index += 1;
    }
    out
}
