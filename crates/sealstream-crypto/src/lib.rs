//! sealstream-crypto: chunked, authenticated stream encryption
//!
//! A plaintext stream is cut into fixed-size chunks, and each chunk is sealed
//! independently with AES-256-GCM under a fresh random nonce:
//!
//! ```text
//! [12 bytes: random nonce][<= 65504 bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The encrypted stream is the bare concatenation of chunks: no header, no
//! length prefix, no chunk count. Every chunk but the last carries exactly
//! [`CHUNK_SIZE`] plaintext bytes, so chunk boundaries are positional and a
//! reader can seek by jumping whole sectors of [`SECTOR_SIZE`] bytes.
//!
//! - [`ChunkWriter`] wraps any `Write` and emits sealed chunks as they fill.
//! - [`ChunkReader`] wraps any `Read`, opens chunks, and implements `Seek`
//!   when the source exposes the [`Source`] capabilities.

pub mod chunk;
pub mod key;
pub mod reader;
pub mod source;
pub mod writer;

pub use chunk::{open_chunk, seal_chunk, ChunkCipher};
pub use key::Key;
pub use reader::ChunkReader;
pub use sealstream_core::{StreamError, StreamResult};
pub use source::{Seekable, Sequential, Source};
pub use writer::{ChunkWriter, PartialWrite};

/// Size of a key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Per-chunk wire overhead: nonce + tag
pub const CHUNK_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Plaintext bytes per chunk: 4094 AES blocks, keeping a sector just under 64 KiB
pub const CHUNK_SIZE: usize = 4094 * 16;

/// On-wire size of a full chunk
pub const SECTOR_SIZE: usize = CHUNK_SIZE + CHUNK_OVERHEAD;

/// Encrypted length of a stream carrying `plaintext_len` bytes.
pub const fn encrypted_len(plaintext_len: u64) -> u64 {
    let chunks = plaintext_len.div_ceil(CHUNK_SIZE as u64);
    plaintext_len + chunks * CHUNK_OVERHEAD as u64
}

/// Plaintext length of an encrypted stream of `encrypted_len` bytes.
///
/// Fails when the trailing partial sector is too short to hold a nonce and tag.
pub fn plaintext_len(encrypted_len: u64) -> StreamResult<u64> {
    let full = encrypted_len / SECTOR_SIZE as u64;
    let tail = encrypted_len % SECTOR_SIZE as u64;
    let last = match tail {
        0 => 0,
        t if t < CHUNK_OVERHEAD as u64 => {
            return Err(StreamError::InvalidEncryptedLength(encrypted_len))
        }
        t => t - CHUNK_OVERHEAD as u64,
    };
    Ok(full * CHUNK_SIZE as u64 + last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_geometry() {
        assert_eq!(CHUNK_SIZE, 65504);
        assert_eq!(SECTOR_SIZE, 65532);
        assert!(SECTOR_SIZE < 64 * 1024);
    }

    #[test]
    fn test_encrypted_len() {
        assert_eq!(encrypted_len(0), 0);
        assert_eq!(encrypted_len(1), 29);
        assert_eq!(encrypted_len(CHUNK_SIZE as u64), SECTOR_SIZE as u64);
        assert_eq!(
            encrypted_len(CHUNK_SIZE as u64 + 1),
            SECTOR_SIZE as u64 + 29
        );
    }

    #[test]
    fn test_plaintext_len() {
        assert_eq!(plaintext_len(0).unwrap(), 0);
        assert_eq!(plaintext_len(28).unwrap(), 0);
        assert_eq!(plaintext_len(SECTOR_SIZE as u64).unwrap(), CHUNK_SIZE as u64);
        assert_eq!(
            plaintext_len(2 * SECTOR_SIZE as u64 + 45).unwrap(),
            2 * CHUNK_SIZE as u64 + 17
        );
    }

    #[test]
    fn test_plaintext_len_rejects_short_tail() {
        assert_eq!(
            plaintext_len(SECTOR_SIZE as u64 + 5),
            Err(StreamError::InvalidEncryptedLength(SECTOR_SIZE as u64 + 5))
        );
    }

    #[test]
    fn test_len_helpers_are_inverse() {
        for n in [0u64, 1, 15, 16, 17, 65503, 65504, 65505, 3 * 65504, 1_000_000] {
            assert_eq!(plaintext_len(encrypted_len(n)).unwrap(), n);
        }
    }
}
