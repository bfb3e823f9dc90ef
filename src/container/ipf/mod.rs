//! # IPF/CAPS Decoder (§4.3)
//!
//! Parses an IPF record stream, validates record CRCs, and exposes a
//! track-by-track structured view sufficient to reconstruct flux and
//! flag copy-protection markers. Tolerates unknown record types.

pub mod data;
pub mod image;
pub mod info;
pub mod record;
pub mod writer;

pub use data::{BlockDescriptor, BlockUnion, DataRecord, TrackBlock};
pub use image::ImageRecord;
pub use info::InfoRecord;
pub use record::CrcMode;
pub use writer::IpfWriter;

use std::collections::BTreeMap;

/// Closed error taxonomy for the IPF engine (§7).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not an IPF stream")]
    NotIpf,
    #[error("CRC mismatch")]
    BadCrc,
    #[error("record stream truncated")]
    Truncated,
    #[error("malformed record")]
    BadRecord,
    #[error("DATA record references an unknown IMGE key")]
    KeyMismatch,
    #[error("file I/O error")]
    FileError,
    #[error("allocation failed")]
    NoMem,
    #[error("operation not supported")]
    NotSupported,
    #[error("unsupported IPF version")]
    UnsupportedVersion,
    #[error("bad magic")]
    BadMagic,
}

pub const WARN_CRC_MISMATCH: u32 = 0x1;
pub const WARN_TRUNCATED: u32 = 0x2;
pub const WARN_UNKNOWN_RECORDS: u32 = 0x4;
pub const WARN_MISSING_INFO: u32 = 0x8;
pub const WARN_MISSING_IMGE: u32 = 0x10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Warnings(pub u32);

impl Warnings {
    pub fn set(&mut self, bit: u32) {
        self.0 |= bit;
    }
    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackSummary {
    pub track: u32,
    pub side: u32,
    pub block_count: u32,
    pub protected: bool,
    pub fuzzy: bool,
    /// Per-block descriptors, each with its SPS gap/data element streams
    /// decoded when present (§4.3 "Block-descriptor parsing", "SPS
    /// element streams") — enough for a writer to carry a track forward
    /// verbatim.
    pub blocks: Vec<TrackBlock>,
}

#[derive(Clone, Debug, Default)]
pub struct IpfImage {
    pub info: Option<InfoRecord>,
    pub tracks: Vec<TrackSummary>,
    pub unknown_tags: Vec<[u8; 4]>,
    pub warnings: Warnings,
}

/// First four bytes == "CAPS" → confidence 95 (§4.3 "Probe").
pub fn probe(data: &[u8]) -> Option<u8> {
    if data.len() >= 4 && &data[0..4] == record::TAG_CAPS.as_slice() {
        Some(95)
    } else {
        None
    }
}

/// Parse an IPF byte stream. CRC mismatches accumulate as a warning
/// rather than aborting the parse (§4.3/§7 "Recovery").
pub fn parse(data: &[u8], crc_mode: CrcMode) -> Result<IpfImage, Error> {
    parse_inner(data, crc_mode, false)
}

/// Like [`parse`], but any CRC mismatch is a hard error.
pub fn parse_strict(data: &[u8], crc_mode: CrcMode) -> Result<IpfImage, Error> {
    parse_inner(data, crc_mode, true)
}

fn parse_inner(data: &[u8], crc_mode: CrcMode, strict: bool) -> Result<IpfImage, Error> {
    let records = record::parse_all(data);
    let Some(first) = records.first() else { return Err(Error::NotIpf) };
    if first.tag != record::TAG_CAPS {
        return Err(Error::NotIpf);
    }

    let mut image = IpfImage::default();
    let mut image_pool: BTreeMap<u32, ImageRecord> = BTreeMap::new();

    for record in &records[1..] {
        if !record.crc_valid(crc_mode) {
            if strict {
                return Err(Error::BadCrc);
            }
            log::warn!("CRC mismatch in {:?} record, continuing in tolerant mode", record.tag);
            image.warnings.set(WARN_CRC_MISMATCH);
        }

        match record.tag {
            record::TAG_INFO => {
                let info = info::InfoRecord::parse(&record.payload).ok_or(Error::BadRecord)?;
                image.info = Some(info);
            }
            record::TAG_IMGE => {
                let rec = image::ImageRecord::parse(&record.payload).ok_or(Error::BadRecord)?;
                image_pool.insert(rec.key(), rec);
            }
            record::TAG_DATA => {
                let (data_rec, extra) = data::DataRecord::parse(&record.payload).ok_or(Error::BadRecord)?;
                let img = image_pool.get(&data_rec.key).ok_or(Error::KeyMismatch)?;
                let encoder_type = image.info.as_ref().map(|i| i.encoder_type).unwrap_or(0);
                let (descriptors, _consumed) = data::parse_block_descriptors(extra, img.block_count, encoder_type)
                    .ok_or(Error::Truncated)?;
                let blocks = descriptors
                    .into_iter()
                    .map(|descriptor| {
                        let (gaps, elements) = match descriptor.union {
                            data::BlockUnion::Sps { gap_offset, .. } => {
                                let gap_bytes = extra.get(gap_offset as usize..).unwrap_or(&[]);
                                let (gaps, gap_len) = data::parse_gap_stream(gap_bytes, descriptor.has_backward_gap());
                                let data_bytes = gap_bytes.get(gap_len..).unwrap_or(&[]);
                                let (elements, _) = data::parse_data_stream(data_bytes, descriptor.sizes_in_bits());
                                (gaps, elements)
                            }
                            data::BlockUnion::Caps { .. } => (Vec::new(), Vec::new()),
                        };
                        data::TrackBlock { descriptor, gaps, elements }
                    })
                    .collect();
                image.tracks.push(TrackSummary {
                    track: img.track,
                    side: img.side,
                    block_count: img.block_count,
                    protected: img.is_protected(),
                    fuzzy: img.is_fuzzy(),
                    blocks,
                });
            }
            other => {
                log::debug!("unrecognised record tag {:?}, preserving and continuing", other);
                image.unknown_tags.push(other);
                image.warnings.set(WARN_UNKNOWN_RECORDS);
            }
        }
    }

    if image.info.is_none() {
        image.warnings.set(WARN_MISSING_INFO);
    }
    if image_pool.is_empty() {
        image.warnings.set(WARN_MISSING_IMGE);
    }
    image.tracks.sort_by(|a, b| (a.track, a.side).cmp(&(b.track, b.side)));
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ipf::info::{EncoderType, Platform};
    use crate::primitives::endian;

    #[test]
    fn probe_matches_caps_magic() {
        assert_eq!(probe(b"CAPS\x00\x00\x00\x0c"), Some(95));
        assert_eq!(probe(b"XXXX"), None);
    }

    #[test]
    fn non_caps_first_record_is_not_ipf() {
        let bytes = record::encode(record::TAG_INFO, &[]);
        assert!(matches!(parse(&bytes, CrcMode::PayloadOnly), Err(Error::NotIpf)));
    }

    #[test]
    fn unknown_record_between_info_and_imge_is_preserved_and_counted() {
        let mut buf = record::encode(record::TAG_CAPS, &[]);
        let info = InfoRecord {
            media_type: 0,
            encoder_type: 1,
            encoder_type_enum: EncoderType::Caps,
            encoder_rev: 0,
            file_key: 0,
            file_rev: 0,
            origin: 0,
            min_track: 0,
            max_track: 0,
            min_side: 0,
            max_side: 0,
            creation_date: 0,
            creation_time: 0,
            platforms: [Platform::Amiga, Platform::Unknown(0), Platform::Unknown(0), Platform::Unknown(0)],
            disk_number: 0,
            creator_id: 0,
        };
        buf.extend_from_slice(&record::encode(record::TAG_INFO, &info.to_bytes()));
        buf.extend_from_slice(&record::encode(record::TAG_COMM, b"note"));
        let image = parse(&buf, CrcMode::PayloadOnly).unwrap();
        assert_eq!(image.unknown_tags, vec![record::TAG_COMM]);
        assert!(image.warnings.contains(WARN_UNKNOWN_RECORDS));
        assert!(image.warnings.contains(WARN_MISSING_IMGE));
    }

    #[test]
    fn data_with_no_matching_imge_is_key_mismatch() {
        let mut buf = record::encode(record::TAG_CAPS, &[]);
        let mut data_payload = vec![0u8; data::DATA_HEADER_LEN];
        data_payload[12..16].copy_from_slice(&99u32.to_be_bytes());
        buf.extend_from_slice(&record::encode(record::TAG_DATA, &data_payload));
        assert!(matches!(parse(&buf, CrcMode::PayloadOnly), Err(Error::KeyMismatch)));
    }

    #[test]
    fn sps_block_descriptor_streams_reach_image_blocks() {
        let mut buf = record::encode(record::TAG_CAPS, &[]);
        let info = InfoRecord {
            media_type: 0,
            encoder_type: 2,
            encoder_type_enum: EncoderType::Unknown(2),
            encoder_rev: 0,
            file_key: 0,
            file_rev: 0,
            origin: 0,
            min_track: 0,
            max_track: 0,
            min_side: 0,
            max_side: 0,
            creation_date: 0,
            creation_time: 0,
            platforms: [Platform::Amiga, Platform::Unknown(0), Platform::Unknown(0), Platform::Unknown(0)],
            disk_number: 0,
            creator_id: 0,
        };
        buf.extend_from_slice(&record::encode(record::TAG_INFO, &info.to_bytes()));

        let img = ImageRecord {
            track: 0,
            side: 0,
            density: 0,
            signal_type: 0,
            track_bytes: 0,
            start_byte_pos: 0,
            start_bit_pos: 0,
            data_bits: 0,
            gap_bits: 0,
            track_bits: 0,
            block_count: 1,
            encoder_process: 0,
            track_flags: 0,
            data_key: 7,
        };
        buf.extend_from_slice(&record::encode(record::TAG_IMGE, &img.to_bytes()));

        // One SPS block descriptor whose gap_offset points right past the
        // 32-byte descriptor table, at the start of the gap/data streams.
        let mut descriptor = [0u8; data::BLOCK_DESCRIPTOR_LEN];
        endian::put_be32(&mut descriptor, 8, 32);
        // gap stream: header=(1<<5)|DataLength(1), value=5, sentinel.
        // data stream: header=(1<<5)|Raw(4), size=3 bytes, 3 raw bytes, sentinel.
        let streams = [0x21u8, 0x05, 0x00, 0x24, 0x03, 0xAA, 0xBB, 0xCC, 0x00];
        let mut extra = descriptor.to_vec();
        extra.extend_from_slice(&streams);

        let mut data_payload = vec![0u8; data::DATA_HEADER_LEN];
        data_payload[12..16].copy_from_slice(&7u32.to_be_bytes());
        data_payload.extend_from_slice(&extra);
        buf.extend_from_slice(&record::encode(record::TAG_DATA, &data_payload));

        let image = parse(&buf, CrcMode::PayloadOnly).unwrap();
        assert_eq!(image.tracks.len(), 1);
        let block = &image.tracks[0].blocks[0];
        assert!(matches!(block.descriptor.union, BlockUnion::Sps { gap_offset: 32, .. }));
        assert_eq!(block.gaps.len(), 1);
        assert_eq!(block.gaps[0].preceding_gap_bytes, 5);
        assert_eq!(block.elements.len(), 1);
        assert_eq!(block.elements[0].bytes, vec![0xAA, 0xBB, 0xCC]);
    }
}
