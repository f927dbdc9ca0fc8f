//! Random byte provider passed explicitly into every operation that needs
//! fresh IVs, salts, or keys.

use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// A source of cryptographically secure random bytes.
pub trait RandomSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> CryptoResult<()>;
}

/// The operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> CryptoResult<()> {
        rand::rngs::OsRng
            .try_fill_bytes(buf)
            .map_err(|e| CryptoError::RandomUnavailable(e.to_string()))
    }
}

pub(crate) fn random_array<const N: usize>(rng: &dyn RandomSource) -> CryptoResult<[u8; N]> {
    let mut out = [0u8; N];
    rng.fill(&mut out)?;
    Ok(out)
}

/// Deterministic source for tests: every call returns the next bytes of a
/// wrapping counter.
#[cfg(test)]
pub(crate) struct CountingRandom {
    next: std::sync::Mutex<u8>,
}

#[cfg(test)]
impl CountingRandom {
    pub(crate) fn new(start: u8) -> Self {
        Self {
            next: std::sync::Mutex::new(start),
        }
    }
}

#[cfg(test)]
impl RandomSource for CountingRandom {
    fn fill(&self, buf: &mut [u8]) -> CryptoResult<()> {
        let mut next = self.next.lock().unwrap();
        for b in buf.iter_mut() {
            *b = *next;
            *next = next.wrapping_add(1);
        }
        Ok(())
    }
}

/// A source whose entropy pool is gone.
#[cfg(test)]
pub(crate) struct BrokenRandom;

#[cfg(test)]
impl RandomSource for BrokenRandom {
    fn fill(&self, _buf: &mut [u8]) -> CryptoResult<()> {
        Err(CryptoError::RandomUnavailable("entropy source closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_random_fills_distinct_buffers() {
        let a: [u8; 32] = random_array(&OsRandom).unwrap();
        let b: [u8; 32] = random_array(&OsRandom).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_counting_random_is_deterministic() {
        let rng = CountingRandom::new(250);
        let a: [u8; 4] = random_array(&rng).unwrap();
        let b: [u8; 4] = random_array(&rng).unwrap();
        assert_eq!(a, [250, 251, 252, 253]);
        assert_eq!(b, [254, 255, 0, 1]);
    }
}
