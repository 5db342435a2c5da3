//! Streaming AES-128-CBC segment decryption.
//!
//! Segments are decrypted while being appended to the output, so memory use
//! stays at one read buffer regardless of segment size.

use std::path::Path;

use aes::Aes128;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, KeyIvInit};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::TransferError;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

const BLOCK: usize = 16;
const READ_SIZE: usize = 16 * 1024;

/// Incremental CBC decryptor with PKCS#7 unpadding at `finish`.
///
/// The last decrypted block is held back until the input ends because only
/// it carries padding.
pub struct SegmentDecryptor {
    cipher: Aes128CbcDec,
    pending: Vec<u8>,
    held: Option<[u8; BLOCK]>,
}

impl SegmentDecryptor {
    pub fn new(key: &[u8; 16], iv: &[u8; 16]) -> Result<Self, TransferError> {
        let cipher = Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|e| TransferError::Decrypt(format!("cannot initialise AES-128-CBC: {}", e)))?;
        Ok(Self {
            cipher,
            pending: Vec::with_capacity(READ_SIZE + BLOCK),
            held: None,
        })
    }

    /// Decrypts every complete block of `input`, appending plaintext to `out`.
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(input);
        let whole = self.pending.len() / BLOCK * BLOCK;
        for chunk in self.pending[..whole].chunks_exact(BLOCK) {
            let mut block = [0u8; BLOCK];
            block.copy_from_slice(chunk);
            self.cipher
                .decrypt_block_mut(GenericArray::from_mut_slice(&mut block));
            if let Some(prev) = self.held.replace(block) {
                out.extend_from_slice(&prev);
            }
        }
        self.pending.drain(..whole);
    }

    /// Strips padding from the final block and appends what remains.
    pub fn finish(self, out: &mut Vec<u8>) -> Result<(), TransferError> {
        if !self.pending.is_empty() {
            return Err(TransferError::Decrypt(format!(
                "ciphertext is not a multiple of {} bytes ({} trailing)",
                BLOCK,
                self.pending.len()
            )));
        }
        let last = self
            .held
            .ok_or_else(|| TransferError::Decrypt("empty ciphertext".to_string()))?;
        let pad = last[BLOCK - 1] as usize;
        if pad == 0 || pad > BLOCK || last[BLOCK - pad..].iter().any(|&b| b as usize != pad) {
            return Err(TransferError::Decrypt("invalid PKCS#7 padding".to_string()));
        }
        out.extend_from_slice(&last[..BLOCK - pad]);
        Ok(())
    }
}

/// Decrypts the segment at `src` and appends its plaintext to `out`.
/// Returns the number of plaintext bytes written.
pub async fn decrypt_into(
    src: &Path,
    out: &mut File,
    out_path: &Path,
    key: &[u8; 16],
    iv: &[u8; 16],
) -> Result<u64, TransferError> {
    let mut input = File::open(src)
        .await
        .map_err(|e| TransferError::io(src, e))?;
    let mut dec = SegmentDecryptor::new(key, iv)?;
    let mut buf = vec![0u8; READ_SIZE];
    let mut plain = Vec::with_capacity(READ_SIZE + BLOCK);
    let mut written = 0u64;
    loop {
        let n = input
            .read(&mut buf)
            .await
            .map_err(|e| TransferError::io(src, e))?;
        if n == 0 {
            break;
        }
        dec.update(&buf[..n], &mut plain);
        if !plain.is_empty() {
            out.write_all(&plain)
                .await
                .map_err(|e| TransferError::io(out_path, e))?;
            written += plain.len() as u64;
            plain.clear();
        }
    }
    dec.finish(&mut plain)
        .map_err(|e| TransferError::Decrypt(format!("{}: {}", src.display(), e)))?;
    out.write_all(&plain)
        .await
        .map_err(|e| TransferError::io(out_path, e))?;
    written += plain.len() as u64;
    Ok(written)
}
