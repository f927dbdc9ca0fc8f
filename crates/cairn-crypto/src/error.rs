use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failures surfaced by the ciphers.
///
/// Precondition violations name what was wrong. Cryptographic failures
/// (`DecryptionFailed`, `WrongPasswordOrCorruptData`) never carry detail
/// about which check failed.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("invalid salt length: expected 16 bytes, got {got}")]
    InvalidSalt { got: usize },

    #[error("no content key configured")]
    KeyUnavailable,

    /// Part of the public taxonomy for callers matching on missing cipher
    /// support. The software AES backend is always compiled in, so nothing
    /// in this crate returns it; [`crate::ContentCipher::is_available`]
    /// reports key availability instead.
    #[error("encryption is not available in this environment")]
    EncryptionUnavailable,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("password must not be empty")]
    EmptyPassword,

    #[error("a password is required to reveal an encoded secret")]
    MissingPassword,

    #[error("wrong password or corrupt data")]
    WrongPasswordOrCorruptData,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("random source unavailable: {0}")]
    RandomUnavailable(String),
}

impl From<CryptoError> for cairn_core::CairnError {
    fn from(e: CryptoError) -> Self {
        cairn_core::CairnError::Crypto(e.to_string())
    }
}
