//! Key digests.
//!
//! A key is folded into a `u64` with `digest = digest * base + byte`, wrapping
//! on overflow. The digest is used directly as the aggregation map key, so two
//! keys with the same digest are aggregated together. With the default base of
//! 257 every key of up to seven bytes that does not start with a NUL byte gets
//! a distinct digest; longer keys can collide. A base of 256 keeps only the
//! last eight bytes of a key, which makes collisions easy to construct.

pub type KeyDigest = u64;

pub const MIN_BASE: u64 = 256;
pub const DEFAULT_BASE: u64 = 257;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHasher {
    base: u64,
}

impl KeyHasher {
    pub fn new(base: u64) -> Self {
        Self { base }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    #[inline(always)]
    pub fn digest(&self, key: &[u8]) -> KeyDigest {
        let mut digest: u64 = 0;
        for &b in key {
            digest = digest.wrapping_mul(self.base).wrapping_add(b as u64);
        }
        digest
    }
}

impl Default for KeyHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BASE)
    }
}
