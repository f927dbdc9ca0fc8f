//! AES-256-CBC file content encryption/decryption
//!
//! Envelope format (binary):
//! ```text
//! [16 bytes: random IV][N bytes: ciphertext, PKCS#7 padded to 16-byte blocks]
//! ```
//!
//! A fresh IV is drawn for every call, so encrypting the same bytes twice
//! under one key never yields the same envelope.

use std::sync::Arc;

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::SymmetricKey;
use crate::random::{random_array, OsRandom, RandomSource};
use crate::{BLOCK_SIZE, IV_SIZE};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Raw CBC encryption under an explicit IV. Output is ciphertext only.
///
/// Callers own IV freshness; [`encrypt`] and the credential cipher always
/// pass a newly drawn one.
pub fn cbc_encrypt(key: &SymmetricKey, iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.as_bytes().into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Raw CBC decryption under an explicit IV.
///
/// Any failure (ragged length, bad padding) is reported as
/// [`CryptoError::DecryptionFailed`] with no further detail.
pub fn cbc_decrypt(
    key: &SymmetricKey,
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::DecryptionFailed);
    }
    Aes256CbcDec::new(key.as_bytes().into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Encrypt `plaintext` under a raw 32-byte key.
///
/// Returns: `[16-byte IV][ciphertext]`
pub fn encrypt(plaintext: &[u8], key: &[u8], rng: &dyn RandomSource) -> CryptoResult<Vec<u8>> {
    let key = SymmetricKey::from_slice(key)?;
    seal(plaintext, &key, rng)
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// A wrong key, a truncated envelope and bad padding all surface as the
/// same [`CryptoError::DecryptionFailed`].
pub fn decrypt(envelope: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    let key = SymmetricKey::from_slice(key)?;
    open(envelope, &key)
}

fn seal(plaintext: &[u8], key: &SymmetricKey, rng: &dyn RandomSource) -> CryptoResult<Vec<u8>> {
    let iv: [u8; IV_SIZE] = random_array(rng)?;
    let ciphertext = cbc_encrypt(key, &iv, plaintext);

    let mut envelope = Vec::with_capacity(IV_SIZE + ciphertext.len());
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

fn open(envelope: &[u8], key: &SymmetricKey) -> CryptoResult<Vec<u8>> {
    if envelope.len() < IV_SIZE + BLOCK_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }
    let (iv, ciphertext) = envelope.split_at(IV_SIZE);
    let iv: &[u8; IV_SIZE] = iv.try_into().map_err(|_| CryptoError::DecryptionFailed)?;
    cbc_decrypt(key, iv, ciphertext)
}

/// Content cipher bound to an optional key.
///
/// With no key configured both directions fail with
/// [`CryptoError::KeyUnavailable`]; bytes are never passed through in the clear.
pub struct ContentCipher {
    key: Option<SymmetricKey>,
    rng: Arc<dyn RandomSource>,
}

impl ContentCipher {
    pub fn new(key: Option<SymmetricKey>) -> Self {
        Self::with_random(key, Arc::new(OsRandom))
    }

    pub fn with_random(key: Option<SymmetricKey>, rng: Arc<dyn RandomSource>) -> Self {
        Self { key, rng }
    }

    /// A cipher with no key; [`is_available`](Self::is_available) is false.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_available(&self) -> bool {
        self.key.is_some()
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let key = self.key.as_ref().ok_or(CryptoError::KeyUnavailable)?;
        let envelope = seal(plaintext, key, self.rng.as_ref())?;
        tracing::trace!(
            plaintext_len = plaintext.len(),
            envelope_len = envelope.len(),
            "encrypted content"
        );
        Ok(envelope)
    }

    pub fn decrypt(&self, envelope: &[u8]) -> CryptoResult<Vec<u8>> {
        let key = self.key.as_ref().ok_or(CryptoError::KeyUnavailable)?;
        open(envelope, key)
    }
}

impl std::fmt::Debug for ContentCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCipher")
            .field("available", &self.is_available())
            .finish()
    }
}
