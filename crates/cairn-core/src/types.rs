use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle for a blob held by the storage network.
///
/// The core never parses it; it is whatever string the store hands back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A per-account secret as persisted in the config file.
///
/// `encoded = false`: `secret` is the plaintext recovery phrase.
/// `encoded = true`: `secret` is a base64 credential envelope
/// (`salt || iv || ciphertext`).
///
/// Records are replaced wholesale, never edited in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub secret: String,
    #[serde(default)]
    pub encoded: bool,
}

impl SecretRecord {
    pub fn plaintext(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            encoded: false,
        }
    }

    pub fn encoded(envelope: impl Into<String>) -> Self {
        Self {
            secret: envelope.into(),
            encoded: true,
        }
    }
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.encoded {
            self.secret.as_str()
        } else {
            "[REDACTED]"
        };
        f.debug_struct("SecretRecord")
            .field("secret", &shown)
            .field("encoded", &self.encoded)
            .finish()
    }
}
