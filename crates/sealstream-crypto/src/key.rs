//! Stream key: 256-bit AES-GCM key with base64 text form

use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{StreamError, StreamResult, KEY_SIZE};

/// A 256-bit stream encryption key. Zeroized on drop.
///
/// The same key is handed to both [`ChunkWriter`](crate::ChunkWriter) and
/// [`ChunkReader`](crate::ChunkReader); each builds its own cipher from it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Key {
    bytes: [u8; KEY_SIZE],
}

impl Key {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Generate a random key from the operating system CSPRNG.
    ///
    /// # Panics
    ///
    /// Panics if the OS random source fails. Use [`Key::try_generate`] to
    /// handle that case instead.
    pub fn generate() -> Self {
        match Self::try_generate() {
            Ok(key) => key,
            Err(e) => panic!("cannot generate stream key: {e}"),
        }
    }

    /// Generate a random key, reporting a failing random source as an error.
    pub fn try_generate() -> StreamResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        if let Err(e) = OsRng.try_fill_bytes(&mut bytes) {
            bytes.zeroize();
            return Err(StreamError::Rng(e.to_string()));
        }
        Ok(Self { bytes })
    }

    /// Standard base64 (with padding) encoding of the key bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// Decode a key from standard base64. Surrounding whitespace is rejected.
    pub fn from_base64(text: &str) -> StreamResult<Self> {
        let mut decoded = STANDARD
            .decode(text)
            .map_err(|e| StreamError::KeyDecode(e.to_string()))?;

        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(StreamError::InvalidKeyLength(len));
        }

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { bytes })
    }
}

impl FromStr for Key {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
