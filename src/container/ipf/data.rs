//! DATA record: a 16-byte header (`length, bit-size, crc, key`) followed
//! by the extra-data segment — `block_count` 32-byte block descriptors,
//! then (for SPS-encoded blocks only) gap and data element streams.

use crate::primitives::endian;

pub const DATA_HEADER_LEN: usize = 16;
pub const BLOCK_DESCRIPTOR_LEN: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataRecord {
    pub length: u32,
    pub bit_size: u32,
    pub crc: u32,
    pub key: u32,
}

impl DataRecord {
    pub fn parse(payload: &[u8]) -> Option<(Self, &[u8])> {
        if payload.len() < DATA_HEADER_LEN {
            return None;
        }
        let record = Self {
            length: endian::be32(payload, 0),
            bit_size: endian::be32(payload, 4),
            crc: endian::be32(payload, 8),
            key: endian::be32(payload, 12),
        };
        Some((record, &payload[DATA_HEADER_LEN..]))
    }
}

/// CAPS block descriptors store byte counts directly; SPS descriptors
/// store offsets into the extra-data segment instead (§9 "tagged unions
/// in IPF block descriptors" — modeled as a sum type keyed on
/// `encoder_type` rather than exposing both interpretations at once).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockUnion {
    Caps { data_bytes: u32, gap_bytes: u32 },
    Sps { gap_offset: u32, cell_type: u32 },
}

pub const BLOCK_FLAG_FORWARD_GAP: u32 = 0x1;
pub const BLOCK_FLAG_BACKWARD_GAP: u32 = 0x2;
pub const BLOCK_FLAG_DATA_IN_BITS: u32 = 0x4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub data_bits: u32,
    pub gap_bits: u32,
    pub union: BlockUnion,
    pub encoder_type: u32,
    pub block_flags: u32,
    pub gap_default: u32,
    pub data_offset: u32,
}

impl BlockDescriptor {
    /// `encoder_type` selects which half of the union the third/fourth
    /// words hold: CAPS (1) uses byte counts, anything else is read as
    /// SPS (offset + cell type).
    pub fn parse(bytes: &[u8], encoder_type: u32) -> Option<Self> {
        if bytes.len() < BLOCK_DESCRIPTOR_LEN {
            return None;
        }
        let field3 = endian::be32(bytes, 8);
        let field4 = endian::be32(bytes, 12);
        let union = if encoder_type == 1 {
            BlockUnion::Caps { data_bytes: field3, gap_bytes: field4 }
        } else {
            BlockUnion::Sps { gap_offset: field3, cell_type: field4 }
        };
        Some(Self {
            data_bits: endian::be32(bytes, 0),
            gap_bits: endian::be32(bytes, 4),
            union,
            encoder_type: endian::be32(bytes, 16),
            block_flags: endian::be32(bytes, 20),
            gap_default: endian::be32(bytes, 24),
            data_offset: endian::be32(bytes, 28),
        })
    }

    pub fn has_forward_gap(&self) -> bool {
        self.block_flags & BLOCK_FLAG_FORWARD_GAP != 0
    }
    pub fn has_backward_gap(&self) -> bool {
        self.block_flags & BLOCK_FLAG_BACKWARD_GAP != 0
    }
    pub fn sizes_in_bits(&self) -> bool {
        self.block_flags & BLOCK_FLAG_DATA_IN_BITS != 0
    }
}

/// A parsed block descriptor alongside its SPS gap/data element streams,
/// when present (§4.3 "SPS element streams"). CAPS-encoded blocks
/// (`encoder_type == 1`) carry byte counts directly in the descriptor
/// and leave both streams empty — there is nothing else to decode.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackBlock {
    pub descriptor: BlockDescriptor,
    pub gaps: Vec<GapStreamEntry>,
    pub elements: Vec<DataStreamEntry>,
}

/// Parse `block_count` consecutive 32-byte descriptors starting at
/// `bytes`'s beginning, returning the descriptors and the offset one
/// past the last one (the start of the gap/data element streams).
pub fn parse_block_descriptors(bytes: &[u8], block_count: u32, encoder_type: u32) -> Option<(Vec<BlockDescriptor>, usize)> {
    let mut out = Vec::with_capacity(block_count as usize);
    let mut offset = 0usize;
    for _ in 0..block_count {
        let chunk = bytes.get(offset..offset + BLOCK_DESCRIPTOR_LEN)?;
        out.push(BlockDescriptor::parse(chunk, encoder_type)?);
        offset += BLOCK_DESCRIPTOR_LEN;
    }
    Some((out, offset))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapStreamType {
    DataLength,
    SampleLength,
    Unknown(u8),
}

impl From<u8> for GapStreamType {
    fn from(v: u8) -> Self {
        match v {
            1 => GapStreamType::DataLength,
            2 => GapStreamType::SampleLength,
            other => GapStreamType::Unknown(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapDirection {
    Forward,
    Backward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GapStreamEntry {
    pub direction: GapDirection,
    pub kind: GapStreamType,
    pub preceding_gap_bytes: u32,
    pub value: u32,
    pub size_bits: u32,
}

/// Parse the gap element stream: `(size_width<<5)|type` header bytes
/// until a 0x00 sentinel, with the direction flipping from Forward to
/// Backward once the forward stream terminates, if a backward gap was
/// flagged. Returns the entries plus the number of bytes consumed, so
/// a caller can locate whatever follows the stream (e.g. a data stream
/// packed directly after it).
pub fn parse_gap_stream(bytes: &[u8], backward_gap_present: bool) -> (Vec<GapStreamEntry>, usize) {
    let mut out = Vec::new();
    let mut offset = 0usize;
    let mut direction = GapDirection::Forward;
    let mut switched = false;

    while offset < bytes.len() {
        let header = bytes[offset];
        offset += 1;
        if header == 0x00 {
            if direction == GapDirection::Forward && backward_gap_present && !switched {
                direction = GapDirection::Backward;
                switched = true;
                continue;
            }
            break;
        }
        let size_width = (header >> 5) as usize;
        let kind = GapStreamType::from(header & 0x1F);
        if offset + size_width > bytes.len() {
            break;
        }
        let mut preceding_gap_bytes: u32 = 0;
        for i in 0..size_width {
            preceding_gap_bytes = (preceding_gap_bytes << 8) | bytes[offset + i] as u32;
        }
        offset += size_width;

        let (value, size_bits) = if kind == GapStreamType::SampleLength {
            let sample_bytes = (preceding_gap_bytes as usize) / 8;
            let value = bytes.get(offset).copied().unwrap_or(0) as u32;
            offset += sample_bytes;
            (value, preceding_gap_bytes)
        } else {
            (preceding_gap_bytes, 0)
        };

        out.push(GapStreamEntry { direction, kind, preceding_gap_bytes, value, size_bits });
    }
    (out, offset)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataStreamType {
    Sync,
    Data,
    IGap,
    Raw,
    Fuzzy,
    Unknown(u8),
}

impl From<u8> for DataStreamType {
    fn from(v: u8) -> Self {
        match v {
            1 => DataStreamType::Sync,
            2 => DataStreamType::Data,
            3 => DataStreamType::IGap,
            4 => DataStreamType::Raw,
            5 => DataStreamType::Fuzzy,
            other => DataStreamType::Unknown(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataStreamEntry {
    pub kind: DataStreamType,
    pub size_bits: u32,
    pub bytes: Vec<u8>,
}

/// Parse the data element stream: same header encoding as the gap
/// stream, but size units depend on `sizes_in_bits`, and `Fuzzy`
/// elements carry no sample bytes. Returns the entries plus the number
/// of bytes consumed.
pub fn parse_data_stream(bytes: &[u8], sizes_in_bits: bool) -> (Vec<DataStreamEntry>, usize) {
    let mut out = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let header = bytes[offset];
        offset += 1;
        if header == 0x00 {
            break;
        }
        let size_width = (header >> 5) as usize;
        let kind = DataStreamType::from(header & 0x1F);
        if offset + size_width > bytes.len() {
            break;
        }
        let mut size: u32 = 0;
        for i in 0..size_width {
            size = (size << 8) | bytes[offset + i] as u32;
        }
        offset += size_width;

        let size_bits = if sizes_in_bits { size } else { size * 8 };

        let data = if kind == DataStreamType::Fuzzy {
            Vec::new()
        } else {
            let nbytes = (size_bits as usize).div_ceil(8);
            let Some(slice) = bytes.get(offset..offset + nbytes) else { break };
            offset += nbytes;
            slice.to_vec()
        };
        out.push(DataStreamEntry { kind, size_bits, bytes: data });
    }
    (out, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_descriptor_caps_union() {
        let mut bytes = [0u8; BLOCK_DESCRIPTOR_LEN];
        bytes[8..12].copy_from_slice(&100u32.to_be_bytes());
        bytes[12..16].copy_from_slice(&20u32.to_be_bytes());
        let b = BlockDescriptor::parse(&bytes, 1).unwrap();
        assert_eq!(b.union, BlockUnion::Caps { data_bytes: 100, gap_bytes: 20 });
    }

    #[test]
    fn block_descriptor_sps_union() {
        let mut bytes = [0u8; BLOCK_DESCRIPTOR_LEN];
        bytes[8..12].copy_from_slice(&50u32.to_be_bytes());
        let b = BlockDescriptor::parse(&bytes, 2).unwrap();
        assert!(matches!(b.union, BlockUnion::Sps { gap_offset: 50, .. }));
    }

    #[test]
    fn gap_stream_terminates_on_sentinel() {
        // header = (1<<5)|DataLength(1) = 0x21, one size byte = 5, then sentinel.
        let stream = [0x21, 0x05, 0x00];
        let (entries, consumed) = parse_gap_stream(&stream, false);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].preceding_gap_bytes, 5);
        assert_eq!(entries[0].kind, GapStreamType::DataLength);
        assert_eq!(consumed, stream.len());
    }

    #[test]
    fn data_stream_reads_raw_bytes() {
        // header = (1<<5)|Raw(4) = 0x24, size=3 (bytes), then 3 payload bytes, then sentinel.
        let stream = [0x24, 0x03, 0xAA, 0xBB, 0xCC, 0x00];
        let (entries, consumed) = parse_data_stream(&stream, false);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DataStreamType::Raw);
        assert_eq!(entries[0].bytes, vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(consumed, stream.len());
    }

    #[test]
    fn fuzzy_elements_carry_no_bytes() {
        // header = (1<<5)|Fuzzy(5) = 0x25, size=7 (bits).
        let stream = [0x25, 0x07, 0x00];
        let (entries, _) = parse_data_stream(&stream, true);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].bytes.is_empty());
        assert_eq!(entries[0].size_bits, 7);
    }
}
