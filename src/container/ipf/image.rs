//! IMGE record (80 bytes): one per physical track/side, linking to its
//! DATA record via `data_key`.

use crate::primitives::endian;

pub const IMAGE_LEN: usize = 80;

/// Density/copy-protection class carried in the IMGE record (§4.3
/// "Copy-protection signalling"). Reported, never interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DensityClass {
    Noise,
    Auto,
    CopylockAmiga,
    CopylockAmigaNew,
    CopylockSt,
    SpeedlockAmiga,
    SpeedlockAmigaOld,
    AdamBrierley,
    AdamBrierleyKey,
    Unknown(u32),
}

impl From<u32> for DensityClass {
    fn from(v: u32) -> Self {
        match v {
            0 => DensityClass::Auto,
            1 => DensityClass::Noise,
            2 => DensityClass::CopylockAmiga,
            3 => DensityClass::CopylockAmigaNew,
            4 => DensityClass::CopylockSt,
            5 => DensityClass::SpeedlockAmiga,
            6 => DensityClass::SpeedlockAmigaOld,
            7 => DensityClass::AdamBrierley,
            8 => DensityClass::AdamBrierleyKey,
            other => DensityClass::Unknown(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRecord {
    pub track: u32,
    pub side: u32,
    pub density: u32,
    pub signal_type: u32,
    pub track_bytes: u32,
    pub start_byte_pos: u32,
    pub start_bit_pos: u32,
    pub data_bits: u32,
    pub gap_bits: u32,
    pub track_bits: u32,
    pub block_count: u32,
    pub encoder_process: u32,
    pub track_flags: u32,
    pub data_key: u32,
}

impl ImageRecord {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < IMAGE_LEN {
            return None;
        }
        Some(Self {
            track: endian::be32(payload, 0),
            side: endian::be32(payload, 4),
            density: endian::be32(payload, 8),
            signal_type: endian::be32(payload, 12),
            track_bytes: endian::be32(payload, 16),
            start_byte_pos: endian::be32(payload, 20),
            start_bit_pos: endian::be32(payload, 24),
            data_bits: endian::be32(payload, 28),
            gap_bits: endian::be32(payload, 32),
            track_bits: endian::be32(payload, 36),
            block_count: endian::be32(payload, 40),
            encoder_process: endian::be32(payload, 44),
            track_flags: endian::be32(payload, 48),
            data_key: endian::be32(payload, 52),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; IMAGE_LEN];
        endian::put_be32(&mut out, 0, self.track);
        endian::put_be32(&mut out, 4, self.side);
        endian::put_be32(&mut out, 8, self.density);
        endian::put_be32(&mut out, 12, self.signal_type);
        endian::put_be32(&mut out, 16, self.track_bytes);
        endian::put_be32(&mut out, 20, self.start_byte_pos);
        endian::put_be32(&mut out, 24, self.start_bit_pos);
        endian::put_be32(&mut out, 28, self.data_bits);
        endian::put_be32(&mut out, 32, self.gap_bits);
        endian::put_be32(&mut out, 36, self.track_bits);
        endian::put_be32(&mut out, 40, self.block_count);
        endian::put_be32(&mut out, 44, self.encoder_process);
        endian::put_be32(&mut out, 48, self.track_flags);
        endian::put_be32(&mut out, 52, self.data_key);
        out
    }

    pub fn ch(&self) -> (u32, u32) {
        (self.track, self.side)
    }

    pub fn key(&self) -> u32 {
        self.data_key
    }

    pub fn density_class(&self) -> DensityClass {
        DensityClass::from(self.density)
    }

    pub fn is_fuzzy(&self) -> bool {
        self.track_flags & 0b1 != 0
    }

    pub fn is_protected(&self) -> bool {
        !matches!(self.density_class(), DensityClass::Auto | DensityClass::Noise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_fields() {
        let img = ImageRecord {
            track: 40,
            side: 1,
            density: 2,
            signal_type: 0,
            track_bytes: 6250,
            start_byte_pos: 0,
            start_bit_pos: 0,
            data_bits: 100_000,
            gap_bits: 500,
            track_bits: 100_500,
            block_count: 3,
            encoder_process: 0,
            track_flags: 1,
            data_key: 7,
        };
        let bytes = img.to_bytes();
        let parsed = ImageRecord::parse(&bytes).unwrap();
        assert_eq!(parsed, img);
        assert_eq!(parsed.ch(), (40, 1));
        assert!(parsed.is_fuzzy());
        assert_eq!(parsed.density_class(), DensityClass::CopylockAmiga);
        assert!(parsed.is_protected());
    }
}
