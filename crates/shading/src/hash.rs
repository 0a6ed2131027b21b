//! Content digests used as cache identity for computed tiles.
//!
//! A [`Digest`] is only meaningful within one process: it is built on the
//! standard library's SipHash with fixed keys, which is deterministic for a
//! given build but not a stable on-disk format.
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 64-bit content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Digest(u64);

impl Digest {
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Incrementally accumulates values into a [`Digest`].
#[derive(Debug, Clone, Default)]
pub struct DigestBuilder {
    hasher: DefaultHasher,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append<T: Hash + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.hash(&mut self.hasher);
        self
    }

    /// Floats are hashed by bit pattern, so `-0.0` and `0.0` differ.
    pub fn append_f32(&mut self, value: f32) -> &mut Self {
        self.hasher.write_u32(value.to_bits());
        self
    }

    pub fn append_f64(&mut self, value: f64) -> &mut Self {
        self.hasher.write_u64(value.to_bits());
        self
    }

    pub fn append_floats(&mut self, values: &[f32]) -> &mut Self {
        self.hasher.write_usize(values.len());
        for value in values {
            self.hasher.write_u32(value.to_bits());
        }
        self
    }

    pub fn append_digest(&mut self, digest: Digest) -> &mut Self {
        self.hasher.write_u64(digest.0);
        self
    }

    pub fn finish(&self) -> Digest {
        Digest(self.hasher.finish())
    }
}

pub fn digest_of<T: Hash + ?Sized>(value: &T) -> Digest {
    let mut builder = DigestBuilder::new();
    builder.append(value);
    builder.finish()
}

pub fn digest_of_floats(values: &[f32]) -> Digest {
    let mut builder = DigestBuilder::new();
    builder.append_floats(values);
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_input_yields_identical_digest() {
        let a = digest_of_floats(&[0.25, 0.5, 1.0]);
        let b = digest_of_floats(&[0.25, 0.5, 1.0]);
        assert_eq!(a, b);
        assert_ne!(a, digest_of_floats(&[0.25, 0.5]));
    }

    #[test]
    fn append_order_matters() {
        let mut first = DigestBuilder::new();
        first.append("R").append("G");
        let mut second = DigestBuilder::new();
        second.append("G").append("R");
        assert_ne!(first.finish(), second.finish());
    }

    #[test]
    fn displays_as_fixed_width_hex() {
        assert_eq!(Digest::from_raw(0xab).to_string(), "00000000000000ab");
    }
}
