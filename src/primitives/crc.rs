//! CRC-32/IEEE, as used by IPF records and by a handful of format probes.
//!
//! This wraps the `crc` crate's table-driven implementation rather than
//! hand-rolling a polynomial table, the way `hadris-part` and
//! `hadris-common` pull in `crc` for the same purpose.

use crc::{Crc, CRC_32_ISO_HDLC};

/// CRC-32/IEEE: initial 0xFFFFFFFF, reflected in/out, final XOR 0xFFFFFFFF.
/// `CRC_32_ISO_HDLC` is the `crc` crate's name for this exact algorithm.
const IEEE: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the CRC-32/IEEE of a byte slice.
pub fn crc32_ieee(data: &[u8]) -> u32 {
    IEEE.checksum(data)
}

/// Incremental digest, for streaming callers that do not want to buffer
/// the whole payload (e.g. a capture driver validating as bytes arrive).
pub struct Crc32Digest {
    inner: crc::Digest<'static, u32>,
}

impl Crc32Digest {
    pub fn new() -> Self {
        Self { inner: IEEE.digest() }
    }
    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }
    pub fn finalize(self) -> u32 {
        self.inner.finalize()
    }
}

impl Default for Crc32Digest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // "123456789" is the standard CRC-32/IEEE check vector.
        assert_eq!(crc32_ieee(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn digest_matches_oneshot() {
        let mut d = Crc32Digest::new();
        d.update(b"123456789");
        assert_eq!(d.finalize(), crc32_ieee(b"123456789"));
    }

    #[test]
    fn empty_input() {
        assert_eq!(crc32_ieee(b""), 0);
    }
}
