//! Password protection for recovery phrases stored in the config file
//!
//! Encoded envelope (base64 of):
//! ```text
//! [16 bytes: PBKDF2 salt][16 bytes: CBC IV][N bytes: AES-256-CBC ciphertext]
//! ```
//!
//! Every `protect` draws a fresh salt and IV, so re-protecting the same
//! secret under the same password yields a different envelope.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cairn_core::SecretRecord;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::content::{cbc_decrypt, cbc_encrypt};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::derive_key;
use crate::random::{random_array, RandomSource};
use crate::{IV_SIZE, SALT_SIZE};

/// Encrypt `secret` under `password` and return the base64 envelope.
pub fn protect(
    secret: &SecretString,
    password: &SecretString,
    rng: &dyn RandomSource,
) -> CryptoResult<String> {
    if password.expose_secret().is_empty() {
        return Err(CryptoError::EmptyPassword);
    }

    let salt: [u8; SALT_SIZE] = random_array(rng)?;
    let key = derive_key(password, &salt)?;
    let iv: [u8; IV_SIZE] = random_array(rng)?;
    let ciphertext = cbc_encrypt(&key, &iv, secret.expose_secret().as_bytes());

    let mut raw = Vec::with_capacity(SALT_SIZE + IV_SIZE + ciphertext.len());
    raw.extend_from_slice(&salt);
    raw.extend_from_slice(&iv);
    raw.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(raw))
}

/// Recover the secret from an envelope produced by [`protect`].
///
/// Payloads that are not base64 or are shorter than salt + IV are rejected
/// as [`CryptoError::MalformedEnvelope`] before any key derivation. Every
/// later failure is [`CryptoError::WrongPasswordOrCorruptData`].
pub fn reveal(encoded: &str, password: &SecretString) -> CryptoResult<SecretString> {
    if password.expose_secret().is_empty() {
        return Err(CryptoError::MissingPassword);
    }

    let raw = BASE64
        .decode(encoded.trim())
        .map_err(|_| CryptoError::MalformedEnvelope("credential envelope is not valid base64".into()))?;
    if raw.len() < SALT_SIZE + IV_SIZE {
        return Err(CryptoError::MalformedEnvelope(format!(
            "credential envelope too short: {} bytes (minimum {})",
            raw.len(),
            SALT_SIZE + IV_SIZE
        )));
    }

    let (salt, rest) = raw.split_at(SALT_SIZE);
    let (iv, ciphertext) = rest.split_at(IV_SIZE);
    let iv: &[u8; IV_SIZE] = iv
        .try_into()
        .map_err(|_| CryptoError::WrongPasswordOrCorruptData)?;

    let key = derive_key(password, salt)?;
    let plaintext =
        cbc_decrypt(&key, iv, ciphertext).map_err(|_| CryptoError::WrongPasswordOrCorruptData)?;

    match String::from_utf8(plaintext) {
        Ok(secret) => Ok(SecretString::from(secret)),
        Err(e) => {
            e.into_bytes().zeroize();
            Err(CryptoError::WrongPasswordOrCorruptData)
        }
    }
}

/// Build the record to persist for an account.
///
/// `encode = true` protects the secret with `password`; `encode = false`
/// stores it in the clear, the weaker mode the caller explicitly opts into.
pub fn seal_record(
    secret: &SecretString,
    password: Option<&SecretString>,
    encode: bool,
    rng: &dyn RandomSource,
) -> CryptoResult<SecretRecord> {
    if !encode {
        return Ok(SecretRecord::plaintext(secret.expose_secret()));
    }
    let password = password.ok_or(CryptoError::EmptyPassword)?;
    Ok(SecretRecord::encoded(protect(secret, password, rng)?))
}

/// Read the secret held by a record.
///
/// Plaintext records are returned as stored. Encoded records need a
/// non-empty password.
pub fn open_record(
    record: &SecretRecord,
    password: Option<&SecretString>,
) -> CryptoResult<SecretString> {
    if !record.encoded {
        return Ok(SecretString::from(record.secret.clone()));
    }
    let password = password.ok_or(CryptoError::MissingPassword)?;
    reveal(&record.secret, password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{BrokenRandom, CountingRandom, OsRandom};
    use proptest::prelude::*;

    // Known envelope: secret "abandon ability", password "hunter2",
    // salt = 00..0f, iv = 10..1f
    const KNOWN_ENVELOPE: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh+qffOBsrCs4YfJF6taFjdd";

    fn pw(s: &str) -> SecretString {
        SecretString::from(s)
    }

    #[test]
    fn test_protect_reveal_roundtrip() {
        let secret = pw("legal winner thank year wave sausage worth useful legal winner thank yellow");
        let encoded = protect(&secret, &pw("correct horse"), &OsRandom).unwrap();
        let revealed = reveal(&encoded, &pw("correct horse")).unwrap();
        assert_eq!(revealed.expose_secret(), secret.expose_secret());
    }

    #[test]
    fn test_envelope_format_is_stable() {
        let encoded = protect(&pw("abandon ability"), &pw("hunter2"), &CountingRandom::new(0)).unwrap();
        assert_eq!(encoded, KNOWN_ENVELOPE);
    }

    #[test]
    fn test_reveal_known_envelope() {
        let revealed = reveal(KNOWN_ENVELOPE, &pw("hunter2")).unwrap();
        assert_eq!(revealed.expose_secret(), "abandon ability");
    }

    #[test]
    fn test_reveal_wrong_password() {
        for wrong in ["hunter3", "Hunter2", "wrong"] {
            let result = reveal(KNOWN_ENVELOPE, &pw(wrong));
            assert!(
                matches!(result, Err(CryptoError::WrongPasswordOrCorruptData)),
                "password {wrong:?} must not reveal the secret"
            );
        }
    }

    #[test]
    fn test_fresh_salt_and_iv_per_protect() {
        let secret = pw("same secret");
        let e1 = protect(&secret, &pw("pw"), &OsRandom).unwrap();
        let e2 = protect(&secret, &pw("pw"), &OsRandom).unwrap();
        assert_ne!(e1, e2);

        let r1 = BASE64.decode(&e1).unwrap();
        let r2 = BASE64.decode(&e2).unwrap();
        assert_ne!(r1[..SALT_SIZE], r2[..SALT_SIZE], "salt must be fresh");
        assert_ne!(
            r1[SALT_SIZE..SALT_SIZE + IV_SIZE],
            r2[SALT_SIZE..SALT_SIZE + IV_SIZE],
            "iv must be fresh"
        );
    }

    #[test]
    fn test_protect_empty_password() {
        for secret in ["", "anything", "abandon ability able"] {
            assert!(matches!(
                protect(&pw(secret), &pw(""), &OsRandom),
                Err(CryptoError::EmptyPassword)
            ));
        }
    }

    #[test]
    fn test_reveal_empty_password() {
        assert!(matches!(
            reveal(KNOWN_ENVELOPE, &pw("")),
            Err(CryptoError::MissingPassword)
        ));
    }

    #[test]
    fn test_reveal_short_payload_rejected_before_kdf() {
        for len in [0usize, 1, 16, 31] {
            let encoded = BASE64.encode(vec![0u8; len]);
            let result = reveal(&encoded, &pw("hunter2"));
            assert!(
                matches!(result, Err(CryptoError::MalformedEnvelope(_))),
                "{len}-byte payload must be a format error"
            );
        }
    }

    #[test]
    fn test_reveal_invalid_base64() {
        assert!(matches!(
            reveal("%%% not base64 %%%", &pw("hunter2")),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_reveal_truncated_ciphertext() {
        let mut raw = BASE64.decode(KNOWN_ENVELOPE).unwrap();
        raw.pop();
        let result = reveal(&BASE64.encode(&raw), &pw("hunter2"));
        assert!(matches!(result, Err(CryptoError::WrongPasswordOrCorruptData)));

        // Salt and IV only, no ciphertext at all
        let result = reveal(&BASE64.encode(&raw[..32]), &pw("hunter2"));
        assert!(matches!(result, Err(CryptoError::WrongPasswordOrCorruptData)));
    }

    #[test]
    fn test_protect_random_failure() {
        assert!(matches!(
            protect(&pw("s"), &pw("p"), &BrokenRandom),
            Err(CryptoError::RandomUnavailable(_))
        ));
    }

    #[test]
    fn test_plaintext_record_bypasses_cipher() {
        let record = seal_record(&pw("plain words"), None, false, &BrokenRandom).unwrap();
        assert!(!record.encoded);
        assert_eq!(record.secret, "plain words");

        let secret = open_record(&record, None).unwrap();
        assert_eq!(secret.expose_secret(), "plain words");
    }

    #[test]
    fn test_encoded_record_roundtrip() {
        let record =
            seal_record(&pw("abandon ability"), Some(&pw("hunter2")), true, &CountingRandom::new(0))
                .unwrap();
        assert!(record.encoded);
        assert_eq!(record.secret, KNOWN_ENVELOPE);

        let secret = open_record(&record, Some(&pw("hunter2"))).unwrap();
        assert_eq!(secret.expose_secret(), "abandon ability");
    }

    #[test]
    fn test_encoded_record_missing_password() {
        let record = SecretRecord::encoded(KNOWN_ENVELOPE);
        assert!(matches!(
            open_record(&record, None),
            Err(CryptoError::MissingPassword)
        ));
        assert!(matches!(
            open_record(&record, Some(&pw(""))),
            Err(CryptoError::MissingPassword)
        ));
    }

    #[test]
    fn test_seal_encoded_requires_password() {
        assert!(matches!(
            seal_record(&pw("s"), None, true, &OsRandom),
            Err(CryptoError::EmptyPassword)
        ));
        assert!(matches!(
            seal_record(&pw("s"), Some(&pw("")), true, &OsRandom),
            Err(CryptoError::EmptyPassword)
        ));
    }

    #[test]
    fn test_reencoding_replaces_envelope() {
        let secret = pw("abandon ability");
        let first = seal_record(&secret, Some(&pw("hunter2")), true, &OsRandom).unwrap();
        let second = seal_record(&secret, Some(&pw("hunter2")), true, &OsRandom).unwrap();
        assert_ne!(first.secret, second.secret);

        // Encoded -> plaintext -> encoded under a new password
        let revealed = open_record(&first, Some(&pw("hunter2"))).unwrap();
        let plain = seal_record(&revealed, None, false, &OsRandom).unwrap();
        let revealed = open_record(&plain, None).unwrap();
        let again = seal_record(&revealed, Some(&pw("new")), true, &OsRandom).unwrap();
        assert_eq!(
            open_record(&again, Some(&pw("new"))).unwrap().expose_secret(),
            "abandon ability"
        );
    }

    proptest! {
        // Each case runs PBKDF2 twice at full strength
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_protect_reveal_roundtrip(secret in "\\PC{0,64}", password in "\\PC{1,32}") {
            let encoded = protect(&pw(&secret), &pw(&password), &OsRandom).unwrap();
            let revealed = reveal(&encoded, &pw(&password)).unwrap();
            prop_assert_eq!(revealed.expose_secret(), secret.as_str());
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(6))]

        #[test]
        fn prop_other_password_never_reveals(
            secret in "[a-z ]{1,48}",
            right in "\\PC{1,16}",
            wrong in "\\PC{1,16}",
        ) {
            prop_assume!(right != wrong);
            let encoded = protect(&pw(&secret), &pw(&right), &OsRandom).unwrap();
            match reveal(&encoded, &pw(&wrong)) {
                Err(e) => prop_assert!(matches!(e, CryptoError::WrongPasswordOrCorruptData)),
                Ok(revealed) => prop_assert_ne!(revealed.expose_secret(), secret.as_str()),
            }
        }
    }
}
