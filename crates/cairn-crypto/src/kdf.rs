//! Key derivation: PBKDF2-HMAC-SHA256 password → 256-bit key

use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::SymmetricKey;
use crate::{KEY_SIZE, SALT_SIZE};

/// PBKDF2 round count.
///
/// Part of the stored credential format: envelopes carry no round count, so
/// changing this makes every existing envelope undecryptable.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Derive a 256-bit key from a password and a 16-byte salt.
///
/// Deterministic for identical inputs. The salt is not secret and is stored
/// next to the ciphertext it protects.
pub fn derive_key(password: &SecretString, salt: &[u8]) -> CryptoResult<SymmetricKey> {
    if salt.len() != SALT_SIZE {
        return Err(CryptoError::InvalidSalt { got: salt.len() });
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        salt,
        PBKDF2_ITERATIONS,
        &mut key,
    );
    Ok(SymmetricKey::from_bytes(key))
}
