//! cairn-crypto: protection for file contents and stored credentials
//!
//! Content envelope (raw bytes, handed to the storage network as-is):
//! ```text
//! [16 bytes: random IV][N bytes: AES-256-CBC ciphertext, PKCS#7 padded]
//! ```
//!
//! Credential envelope (base64 text, stored in the config file):
//! ```text
//! base64( [16 bytes: salt][16 bytes: IV][N bytes: AES-256-CBC ciphertext] )
//! key = PBKDF2-HMAC-SHA256(password, salt, 100_000 rounds, 32 bytes)
//! ```

pub mod content;
pub mod credential;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod random;

pub use content::{decrypt, encrypt, ContentCipher};
pub use credential::{open_record, protect, reveal, seal_record};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_key, PBKDF2_ITERATIONS};
pub use keys::SymmetricKey;
pub use random::{OsRandom, RandomSource};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of a CBC initialization vector (one AES block)
pub const IV_SIZE: usize = 16;

/// Size of a PBKDF2 salt
pub const SALT_SIZE: usize = 16;

/// AES block size; every CBC ciphertext is a non-zero multiple of it
pub const BLOCK_SIZE: usize = 16;
