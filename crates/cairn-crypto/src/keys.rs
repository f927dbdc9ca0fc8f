//! 256-bit symmetric key: raw content keys and password-derived keys alike

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::random::{random_array, RandomSource};
use crate::KEY_SIZE;

/// A 256-bit AES key. Zeroized on drop.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a key from untrusted input. Anything other than exactly 32
    /// bytes is rejected; keys are never truncated or padded.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            got: bytes.len(),
        })?;
        Ok(Self { bytes })
    }

    /// Generate a fresh random key.
    pub fn generate(rng: &dyn RandomSource) -> CryptoResult<Self> {
        Ok(Self {
            bytes: random_array(rng)?,
        })
    }

    /// Decode a key stored as standard base64 (the `[crypto] key` config value).
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let mut raw = BASE64
            .decode(encoded.trim())
            .map_err(|_| CryptoError::MalformedEnvelope("content key is not valid base64".into()))?;
        let key = Self::from_slice(&raw);
        raw.zeroize();
        key
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
