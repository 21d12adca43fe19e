//! Chunked AES-256-GCM for file payloads
//!
//! Encrypted blob format (binary):
//! ```text
//! [chunk 0: ciphertext || 16-byte tag][chunk 1: ...]...[chunk n-1: ...]
//! nonce_i = base_iv with bytes 4..12 XOR i (u64, big-endian)
//! AAD_i   = i (8 bytes, big-endian) || final flag (1 byte)
//! ```
//!
//! Every chunk but the last carries exactly `chunk_size` plaintext bytes. The
//! AAD binds each chunk to its position and marks the end of the stream, so
//! reordering, truncation, and appended chunks all fail authentication.

use crate::cipher::{open, random_iv, seal};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::DerivedKey;
use crate::{IV_SIZE, TAG_SIZE};

/// Derive the nonce for chunk `index` from the per-file base IV.
fn chunk_nonce(base_iv: &[u8; IV_SIZE], index: u64) -> [u8; IV_SIZE] {
    let mut nonce = *base_iv;
    let mut counter = [0u8; 8];
    counter.copy_from_slice(&base_iv[4..]);
    let mixed = u64::from_be_bytes(counter) ^ index;
    nonce[4..].copy_from_slice(&mixed.to_be_bytes());
    nonce
}

/// Build AAD: chunk_index (8 bytes BE) || final flag (1 byte)
fn build_aad(index: u64, last: bool) -> [u8; 9] {
    let mut aad = [0u8; 9];
    aad[..8].copy_from_slice(&index.to_be_bytes());
    aad[8] = last as u8;
    aad
}

/// Stateful encryptor for one file. Created with a fresh random base IV.
pub struct StreamSealer<'k> {
    key: &'k DerivedKey,
    base_iv: [u8; IV_SIZE],
    index: u64,
    finished: bool,
}

impl<'k> StreamSealer<'k> {
    pub(crate) fn new(key: &'k DerivedKey) -> Self {
        Self {
            key,
            base_iv: random_iv(),
            index: 0,
            finished: false,
        }
    }

    pub fn base_iv(&self) -> [u8; IV_SIZE] {
        self.base_iv
    }

    /// Encrypt the next chunk. `last` must be set on the final chunk only.
    pub fn seal_chunk(&mut self, chunk: &[u8], last: bool) -> CryptoResult<Vec<u8>> {
        if self.finished {
            return Err(CryptoError::Encryption(
                "stream already finished with a final chunk".into(),
            ));
        }
        let nonce = chunk_nonce(&self.base_iv, self.index);
        let sealed = seal(self.key, &nonce, &build_aad(self.index, last), chunk)?;
        self.index += 1;
        self.finished = last;
        Ok(sealed)
    }
}

/// Stateful decryptor mirroring `StreamSealer`.
pub struct StreamOpener<'k> {
    key: &'k DerivedKey,
    base_iv: [u8; IV_SIZE],
    index: u64,
}

impl<'k> StreamOpener<'k> {
    pub(crate) fn new(key: &'k DerivedKey, base_iv: [u8; IV_SIZE]) -> Self {
        Self {
            key,
            base_iv,
            index: 0,
        }
    }

    pub fn open_chunk(&mut self, sealed: &[u8], last: bool) -> CryptoResult<Vec<u8>> {
        let nonce = chunk_nonce(&self.base_iv, self.index);
        let plain = open(self.key, &nonce, &build_aad(self.index, last), sealed)?;
        self.index += 1;
        Ok(plain)
    }
}

/// Encrypt `plaintext` in `chunk_size` pieces. Returns the base IV and the blob.
pub fn encrypt_stream(
    key: &DerivedKey,
    plaintext: &[u8],
    chunk_size: usize,
) -> CryptoResult<([u8; IV_SIZE], Vec<u8>)> {
    if chunk_size == 0 {
        return Err(CryptoError::Encryption("chunk size must be non-zero".into()));
    }
    let mut sealer = StreamSealer::new(key);
    let chunk_count = plaintext.len().div_ceil(chunk_size).max(1);
    let mut out = Vec::with_capacity(plaintext.len() + chunk_count * TAG_SIZE);

    if plaintext.is_empty() {
        out.extend_from_slice(&sealer.seal_chunk(&[], true)?);
    } else {
        for (i, chunk) in plaintext.chunks(chunk_size).enumerate() {
            out.extend_from_slice(&sealer.seal_chunk(chunk, i + 1 == chunk_count)?);
        }
    }

    Ok((sealer.base_iv(), out))
}

/// Decrypt a blob produced by `encrypt_stream` (or `StreamSealer`) with the same chunk size.
pub fn decrypt_stream(
    key: &DerivedKey,
    base_iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
    chunk_size: usize,
) -> CryptoResult<Vec<u8>> {
    if chunk_size == 0 {
        return Err(CryptoError::Malformed("chunk size must be non-zero".into()));
    }
    let sealed_chunk = chunk_size + TAG_SIZE;
    let mut opener = StreamOpener::new(key, *base_iv);
    let mut out = Vec::with_capacity(ciphertext.len());

    let mut rest = ciphertext;
    loop {
        if rest.len() <= sealed_chunk {
            out.extend_from_slice(&opener.open_chunk(rest, true)?);
            break;
        }
        let (head, tail) = rest.split_at(sealed_chunk);
        out.extend_from_slice(&opener.open_chunk(head, false)?);
        rest = tail;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;

    fn key() -> DerivedKey {
        DerivedKey::from_bytes([0x11u8; KEY_SIZE])
    }

    #[test]
    fn test_chunk_nonces_are_distinct() {
        let base = [9u8; IV_SIZE];
        assert_eq!(chunk_nonce(&base, 0), base);
        assert_ne!(chunk_nonce(&base, 1), chunk_nonce(&base, 2));
        assert_eq!(chunk_nonce(&base, 5)[..4], base[..4]);
    }

    #[test]
    fn test_roundtrip_across_chunk_boundaries() {
        let key = key();
        for len in [0usize, 1, 15, 16, 17, 32, 33, 100] {
            let data: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let (iv, blob) = encrypt_stream(&key, &data, 16).unwrap();
            let chunks = len.div_ceil(16).max(1);
            assert_eq!(blob.len(), len + chunks * TAG_SIZE, "len={len}");

            let back = decrypt_stream(&key, &iv, &blob, 16).unwrap();
            assert_eq!(back, data, "len={len}");
        }
    }

    #[test]
    fn test_truncated_stream_fails() {
        let key = key();
        let data = vec![0xAAu8; 64];
        let (iv, blob) = encrypt_stream(&key, &data, 16).unwrap();

        // Drop the final chunk entirely: the new last chunk was not sealed as final.
        let truncated = &blob[..blob.len() - (16 + TAG_SIZE)];
        assert!(matches!(
            decrypt_stream(&key, &iv, truncated, 16),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_reordered_chunks_fail() {
        let key = key();
        let data: Vec<u8> = (0..64u8).collect();
        let (iv, blob) = encrypt_stream(&key, &data, 16).unwrap();

        let sealed = 16 + TAG_SIZE;
        let mut swapped = blob.clone();
        swapped[..sealed].copy_from_slice(&blob[sealed..2 * sealed]);
        swapped[sealed..2 * sealed].copy_from_slice(&blob[..sealed]);

        assert!(decrypt_stream(&key, &iv, &swapped, 16).is_err());
    }

    #[test]
    fn test_appended_chunk_fails() {
        let key = key();
        let (iv, mut blob) = encrypt_stream(&key, &[1u8; 16], 16).unwrap();
        let copy = blob.clone();
        blob.extend_from_slice(&copy);

        assert!(decrypt_stream(&key, &iv, &blob, 16).is_err());
    }

    #[test]
    fn test_wrong_chunk_size_fails() {
        let key = key();
        let (iv, blob) = encrypt_stream(&key, &[3u8; 40], 16).unwrap();
        assert!(decrypt_stream(&key, &iv, &blob, 32).is_err());
    }

    #[test]
    fn test_sealer_rejects_chunks_after_final() {
        let key = key();
        let mut sealer = StreamSealer::new(&key);
        sealer.seal_chunk(b"done", true).unwrap();
        assert!(sealer.seal_chunk(b"more", false).is_err());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(encrypt_stream(&key(), b"data", 0).is_err());
        assert!(decrypt_stream(&key(), &[0u8; IV_SIZE], b"data", 0).is_err());
    }
}
