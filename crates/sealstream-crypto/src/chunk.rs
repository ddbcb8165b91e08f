//! Per-chunk AES-256-GCM sealing and opening
//!
//! Sealed chunk format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! No associated data is bound to a chunk. The nonce is drawn from the OS
//! CSPRNG for every seal and never derived from a counter or the data.

use aes_gcm::{
    aead::{Aead, AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::key::Key;
use crate::{StreamError, StreamResult, CHUNK_SIZE, NONCE_SIZE, TAG_SIZE};

/// An AES-256-GCM instance bound to one key, reused across chunks.
#[derive(Clone)]
pub struct ChunkCipher {
    aead: Aes256Gcm,
}

impl ChunkCipher {
    pub fn new(key: &Key) -> Self {
        Self {
            aead: Aes256Gcm::new(key.as_bytes().into()),
        }
    }

    /// Seal `plaintext` into a newly allocated chunk.
    pub fn seal(&self, plaintext: &[u8]) -> StreamResult<Vec<u8>> {
        let mut out = Vec::with_capacity(plaintext.len() + NONCE_SIZE + TAG_SIZE);
        self.seal_into(plaintext, &mut out)?;
        Ok(out)
    }

    /// Seal `plaintext`, replacing the contents of `out` with
    /// `nonce || ciphertext || tag`.
    pub fn seal_into(&self, plaintext: &[u8], out: &mut Vec<u8>) -> StreamResult<()> {
        if plaintext.len() > CHUNK_SIZE {
            return Err(StreamError::ChunkTooLarge(plaintext.len()));
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|e| StreamError::Rng(e.to_string()))?;
        let nonce = Nonce::clone_from_slice(&nonce_bytes);

        out.clear();
        out.reserve(plaintext.len() + NONCE_SIZE + TAG_SIZE);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(plaintext);

        // AES-GCM only fails to seal beyond its 64 GiB message limit.
        let tag = self
            .aead
            .encrypt_in_place_detached(&nonce, b"", &mut out[NONCE_SIZE..])
            .map_err(|_| StreamError::ChunkTooLarge(plaintext.len()))?;
        out.extend_from_slice(&tag);
        Ok(())
    }

    /// Verify and decrypt a sealed chunk.
    ///
    /// No plaintext is returned when authentication fails.
    pub fn open(&self, chunk: &[u8]) -> StreamResult<Vec<u8>> {
        if chunk.len() < NONCE_SIZE {
            return Err(StreamError::MalformedChunk(chunk.len()));
        }

        let (nonce_bytes, ciphertext) = chunk.split_at(NONCE_SIZE);
        self.aead
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| StreamError::AuthenticationFailure)
    }

    /// Verify and decrypt a sealed chunk into `out`, reusing its allocation.
    ///
    /// On failure `out` is zeroed and left empty.
    pub fn open_into(&self, chunk: &[u8], out: &mut Vec<u8>) -> StreamResult<()> {
        out.clear();
        if chunk.len() < NONCE_SIZE {
            return Err(StreamError::MalformedChunk(chunk.len()));
        }
        if chunk.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StreamError::AuthenticationFailure);
        }

        let (nonce_bytes, sealed) = chunk.split_at(NONCE_SIZE);
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);
        out.extend_from_slice(ciphertext);

        let verified = self.aead.decrypt_in_place_detached(
            Nonce::from_slice(nonce_bytes),
            b"",
            out.as_mut_slice(),
            Tag::from_slice(tag),
        );
        if verified.is_err() {
            // the primitive decrypts before comparing tags
            out.zeroize();
            out.clear();
            return Err(StreamError::AuthenticationFailure);
        }
        Ok(())
    }
}

/// Seal a single chunk of at most [`CHUNK_SIZE`] bytes under `key`.
///
/// Returns: `[12-byte nonce][ciphertext][16-byte tag]`
pub fn seal_chunk(key: &Key, plaintext: &[u8]) -> StreamResult<Vec<u8>> {
    ChunkCipher::new(key).seal(plaintext)
}

/// Open a single chunk produced by [`seal_chunk`].
pub fn open_chunk(key: &Key, chunk: &[u8]) -> StreamResult<Vec<u8>> {
    ChunkCipher::new(key).open(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_key() -> Key {
        Key::from_bytes([42u8; 32])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = test_key();
        let plaintext = b"hello, encrypted world!";

        let sealed = seal_chunk(&key, plaintext).unwrap();
        let opened = open_chunk(&key, &sealed).unwrap();

        assert_eq!(&opened, plaintext);
    }

    #[test]
    fn test_seal_open_empty() {
        let key = test_key();

        let sealed = seal_chunk(&key, b"").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + TAG_SIZE);
        assert_eq!(open_chunk(&key, &sealed).unwrap(), b"");
    }

    #[test]
    fn test_sealed_size() {
        let key = test_key();
        let plaintext = vec![0u8; 1000];

        let sealed = seal_chunk(&key, &plaintext).unwrap();

        // nonce (12) + plaintext (1000) + tag (16) = 1028
        assert_eq!(sealed.len(), 12 + 1000 + 16);
    }

    #[test]
    fn test_full_chunk_accepted_oversize_rejected() {
        let key = test_key();

        let full = seal_chunk(&key, &vec![1u8; CHUNK_SIZE]).unwrap();
        assert_eq!(full.len(), crate::SECTOR_SIZE);

        let result = seal_chunk(&key, &vec![1u8; CHUNK_SIZE + 1]);
        assert_eq!(result.unwrap_err(), StreamError::ChunkTooLarge(CHUNK_SIZE + 1));
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let key = test_key();

        let a = seal_chunk(&key, b"same plaintext").unwrap();
        let b = seal_chunk(&key, b"same plaintext").unwrap();

        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_wrong_key() {
        let sealed = seal_chunk(&Key::from_bytes([1u8; 32]), b"secret data").unwrap();
        let result = open_chunk(&Key::from_bytes([2u8; 32]), &sealed);

        assert_eq!(result.unwrap_err(), StreamError::AuthenticationFailure);
    }

    #[test]
    fn test_open_malformed() {
        let key = test_key();

        assert_eq!(
            open_chunk(&key, &[0u8; 11]).unwrap_err(),
            StreamError::MalformedChunk(11)
        );
        assert_eq!(
            open_chunk(&key, &[0u8; 20]).unwrap_err(),
            StreamError::AuthenticationFailure
        );
    }

    #[test]
    fn test_tampered_ciphertext() {
        let key = test_key();

        let mut sealed = seal_chunk(&key, b"secret data").unwrap();
        // Flip a byte in the ciphertext (after nonce)
        sealed[13] ^= 0xFF;

        let result = open_chunk(&key, &sealed);
        assert_eq!(result.unwrap_err(), StreamError::AuthenticationFailure);
    }

    #[test]
    fn test_open_into_reuses_buffer() {
        let cipher = ChunkCipher::new(&test_key());
        let mut out = Vec::new();

        let first = cipher.seal(b"first chunk").unwrap();
        cipher.open_into(&first, &mut out).unwrap();
        assert_eq!(out, b"first chunk");

        let second = cipher.seal(b"2nd").unwrap();
        cipher.open_into(&second, &mut out).unwrap();
        assert_eq!(out, b"2nd");
    }

    #[test]
    fn test_open_into_leaves_nothing_on_failure() {
        let cipher = ChunkCipher::new(&test_key());
        let mut sealed = cipher.seal(b"do not leak me").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        let mut out = b"stale".to_vec();
        let result = cipher.open_into(&sealed, &mut out);

        assert_eq!(result.unwrap_err(), StreamError::AuthenticationFailure);
        assert!(out.is_empty());
    }

    proptest! {
        #[test]
        fn any_bit_flip_is_detected(
            plaintext in proptest::collection::vec(any::<u8>(), 0..512),
            bit in any::<proptest::sample::Index>(),
        ) {
            let cipher = ChunkCipher::new(&test_key());
            let mut sealed = cipher.seal(&plaintext).unwrap();
            let bit = bit.index(sealed.len() * 8);
            sealed[bit / 8] ^= 1 << (bit % 8);

            prop_assert_eq!(cipher.open(&sealed).unwrap_err(), StreamError::AuthenticationFailure);
        }
    }
}
