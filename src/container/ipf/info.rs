//! INFO record (96 bytes): media type, encoder identity, track bounds,
//! creation timestamp, and up to four platform tags.

use crate::primitives::endian;

pub const INFO_LEN: usize = 96;

/// Encoder discriminant (§C supplemental enumeration; `spec.md` leaves
/// this an opaque integer, grounded against fluxfox's `info_record.rs`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncoderType {
    Caps,
    Sps,
    CtRaw,
    Unknown(u32),
}

impl From<u32> for EncoderType {
    fn from(v: u32) -> Self {
        match v {
            1 => EncoderType::Caps,
            2 => EncoderType::Sps,
            3 => EncoderType::CtRaw,
            other => EncoderType::Unknown(other),
        }
    }
}

/// Platform tag (§C supplemental enumeration).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Amiga,
    AtariSt,
    Ibm,
    Unknown(u32),
}

impl From<u32> for Platform {
    fn from(v: u32) -> Self {
        match v {
            1 => Platform::Amiga,
            2 => Platform::AtariSt,
            3 => Platform::Ibm,
            0 => Platform::Unknown(0),
            other => Platform::Unknown(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoRecord {
    pub media_type: u32,
    pub encoder_type: u32,
    pub encoder_type_enum: EncoderType,
    pub encoder_rev: u32,
    pub file_key: u32,
    pub file_rev: u32,
    pub origin: u32,
    pub min_track: u32,
    pub max_track: u32,
    pub min_side: u32,
    pub max_side: u32,
    pub creation_date: u32,
    pub creation_time: u32,
    pub platforms: [Platform; 4],
    pub disk_number: u32,
    pub creator_id: u32,
}

impl InfoRecord {
    /// Parse a 96-byte INFO payload. Shorter payloads are rejected by the
    /// caller (`container::ipf::mod::Error::BadRecord`); this function
    /// assumes the length has already been checked.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < INFO_LEN {
            return None;
        }
        let encoder_type = endian::be32(payload, 4);
        let platforms = [
            Platform::from(endian::be32(payload, 56)),
            Platform::from(endian::be32(payload, 60)),
            Platform::from(endian::be32(payload, 64)),
            Platform::from(endian::be32(payload, 68)),
        ];
        Some(Self {
            media_type: endian::be32(payload, 0),
            encoder_type,
            encoder_type_enum: EncoderType::from(encoder_type),
            encoder_rev: endian::be32(payload, 8),
            file_key: endian::be32(payload, 12),
            file_rev: endian::be32(payload, 16),
            origin: endian::be32(payload, 20),
            min_track: endian::be32(payload, 24),
            max_track: endian::be32(payload, 28),
            min_side: endian::be32(payload, 32),
            max_side: endian::be32(payload, 36),
            creation_date: endian::be32(payload, 40),
            creation_time: endian::be32(payload, 44),
            platforms,
            disk_number: endian::be32(payload, 72),
            creator_id: endian::be32(payload, 76),
        })
    }

    /// Serialize back into a 96-byte payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; INFO_LEN];
        endian::put_be32(&mut out, 0, self.media_type);
        endian::put_be32(&mut out, 4, self.encoder_type);
        endian::put_be32(&mut out, 8, self.encoder_rev);
        endian::put_be32(&mut out, 12, self.file_key);
        endian::put_be32(&mut out, 16, self.file_rev);
        endian::put_be32(&mut out, 20, self.origin);
        endian::put_be32(&mut out, 24, self.min_track);
        endian::put_be32(&mut out, 28, self.max_track);
        endian::put_be32(&mut out, 32, self.min_side);
        endian::put_be32(&mut out, 36, self.max_side);
        endian::put_be32(&mut out, 40, self.creation_date);
        endian::put_be32(&mut out, 44, self.creation_time);
        for (i, p) in self.platforms.iter().enumerate() {
            let v = match p {
                Platform::Amiga => 1,
                Platform::AtariSt => 2,
                Platform::Ibm => 3,
                Platform::Unknown(v) => *v,
            };
            endian::put_be32(&mut out, 56 + i * 4, v);
        }
        endian::put_be32(&mut out, 72, self.disk_number);
        endian::put_be32(&mut out, 76, self.creator_id);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_sps_atari_st() {
        let info = InfoRecord {
            media_type: 1,
            encoder_type: 2,
            encoder_type_enum: EncoderType::Sps,
            encoder_rev: 1,
            file_key: 1,
            file_rev: 1,
            origin: 0,
            min_track: 0,
            max_track: 79,
            min_side: 0,
            max_side: 1,
            creation_date: 20240101,
            creation_time: 120000,
            platforms: [Platform::AtariSt, Platform::Unknown(0), Platform::Unknown(0), Platform::Unknown(0)],
            disk_number: 0,
            creator_id: 0,
        };
        let bytes = info.to_bytes();
        assert_eq!(bytes.len(), INFO_LEN);
        let parsed = InfoRecord::parse(&bytes).unwrap();
        assert_eq!(parsed.encoder_type_enum, EncoderType::Sps);
        assert_eq!(parsed.platforms[0], Platform::AtariSt);
    }
}
