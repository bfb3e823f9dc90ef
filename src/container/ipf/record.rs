//! 12-byte-header record framing: a 4-byte ASCII tag, a big-endian
//! 32-bit total-record length (header included), and a big-endian
//! 32-bit CRC-32/IEEE of the payload.

use crate::primitives::{crc, endian};

pub const TAG_CAPS: [u8; 4] = *b"CAPS";
pub const TAG_INFO: [u8; 4] = *b"INFO";
pub const TAG_IMGE: [u8; 4] = *b"IMGE";
pub const TAG_DATA: [u8; 4] = *b"DATA";
pub const TAG_TRCK: [u8; 4] = *b"TRCK";
pub const TAG_CTEI: [u8; 4] = *b"CTEI";
pub const TAG_CTEX: [u8; 4] = *b"CTEX";
pub const TAG_DUMP: [u8; 4] = *b"DUMP";
pub const TAG_COMM: [u8; 4] = *b"COMM";
pub const TAG_TEXT: [u8; 4] = *b"TEXT";
pub const TAG_USER: [u8; 4] = *b"USER";

const HEADER_LEN: usize = 12;

/// Two conventions exist in the wild for what a record's stored `crc`
/// covers (§9 "IPF CRC scope"). This crate reads the CRC of the payload
/// bytes alone and compares it to the stored value; `HeaderZeroed`
/// exists so callers that know they are reading files produced under
/// the other convention can still validate them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CrcMode {
    #[default]
    PayloadOnly,
    HeaderZeroed,
}

/// One parsed record: its 4-byte tag, its stored CRC, and its payload
/// (the bytes after the 12-byte header, up to `length`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub tag: [u8; 4],
    pub crc: u32,
    pub payload: Vec<u8>,
}

impl Record {
    /// `true` when the stored CRC matches the payload under `mode`.
    pub fn crc_valid(&self, mode: CrcMode) -> bool {
        match mode {
            CrcMode::PayloadOnly => crc::crc32_ieee(&self.payload) == self.crc,
            CrcMode::HeaderZeroed => {
                let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
                buf.extend_from_slice(&self.tag);
                buf.extend_from_slice(&(self.payload.len() as u32 + HEADER_LEN as u32).to_be_bytes());
                buf.extend_from_slice(&[0u8; 4]);
                buf.extend_from_slice(&self.payload);
                crc::crc32_ieee(&buf) == self.crc
            }
        }
    }
}

/// Linear walk over `data`, splitting it into 12-byte-header records.
/// Never panics on malformed input: a record whose declared length
/// would run past the end of `data` truncates the walk rather than
/// reading out of bounds.
pub fn parse_all(data: &[u8]) -> Vec<Record> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset + HEADER_LEN <= data.len() {
        let tag = [data[offset], data[offset + 1], data[offset + 2], data[offset + 3]];
        let length = endian::be32(data, offset + 4) as usize;
        let crc = endian::be32(data, offset + 8);
        if length < HEADER_LEN || offset + length > data.len() {
            break;
        }
        let payload = data[offset + HEADER_LEN..offset + length].to_vec();
        out.push(Record { tag, crc, payload });
        offset += length;
    }
    out
}

/// Serialize one record: tag, total length, payload-only CRC, payload.
pub fn encode(tag: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let length = (HEADER_LEN + payload.len()) as u32;
    let crc = crc::crc32_ieee(payload);
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&tag);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&crc.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_parse_round_trips() {
        let payload = b"hello world".to_vec();
        let bytes = encode(TAG_INFO, &payload);
        let records = parse_all(&bytes);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tag, TAG_INFO);
        assert_eq!(records[0].payload, payload);
        assert!(records[0].crc_valid(CrcMode::PayloadOnly));
    }

    #[test]
    fn truncated_length_stops_the_walk() {
        let mut bytes = encode(TAG_CAPS, &[]);
        bytes.extend_from_slice(&[0xAB; 4]);
        bytes[4..8].copy_from_slice(&999u32.to_be_bytes());
        let records = parse_all(&bytes);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn tampered_payload_fails_crc() {
        let bytes = encode(TAG_INFO, b"abc");
        let mut records = parse_all(&bytes);
        records[0].payload[0] = b'z';
        assert!(!records[0].crc_valid(CrcMode::PayloadOnly));
    }
}
