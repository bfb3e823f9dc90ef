//! # DFI Decoder (§4.4)
//!
//! Parses a DiscFerret DFI container into per-track absolute flux-time
//! and index-time series. No sector decoding is attempted here;
//! consumers feed the flux stream to their own decoder.

use crate::primitives::endian;

pub const MAGIC: [u8; 4] = *b"DFE2";
pub const TRACK_MAGIC: [u8; 4] = *b"TRK0";
const TRACK_HEADER_LEN: usize = 8;
/// Default sample rate when a file does not otherwise specify one.
pub const DEFAULT_SAMPLE_RATE_HZ: u64 = 100_000_000;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not a DFI stream")]
    NotDfi,
    #[error("unsupported DFI version")]
    UnsupportedVersion,
    #[error("track record truncated")]
    Truncated,
}

/// One decoded track: absolute flux times and index-pulse times, both
/// in sample ticks at `sample_rate_hz`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DfiTrack {
    pub cylinder: u32,
    pub head: u32,
    pub sample_rate_hz: u64,
    pub flux_times: Vec<u64>,
    pub index_times: Vec<u64>,
    pub total_time: u64,
}

/// Decode one track's delta-encoded flux stream (§4.4 "Delta decode").
/// Byte 0x00 is reserved/treated as a conservative no-op extension
/// marker (§9 "DFI byte 0x00 interpretation" — this crate passes it
/// through without advancing time or emitting flux, rather than
/// rejecting the stream outright).
pub fn decode_track(cylinder: u32, head: u32, sample_rate_hz: u64, stream: &[u8]) -> DfiTrack {
    let mut running_time: u64 = 0;
    let mut flux_times = Vec::new();
    let mut index_times = Vec::new();

    let mut i = 0usize;
    while i < stream.len() {
        let byte = stream[i];
        if byte == 0x00 {
            i += 1;
            continue;
        }
        if byte == 0xFF {
            if i + 2 >= stream.len() {
                break;
            }
            let delta = endian::le16(stream, i + 1) as u64;
            running_time += delta;
            flux_times.push(running_time);
            i += 3;
            continue;
        }
        if byte & 0x80 != 0 {
            index_times.push(running_time);
            i += 1;
            continue;
        }
        running_time += byte as u64;
        flux_times.push(running_time);
        i += 1;
    }

    DfiTrack { cylinder, head, sample_rate_hz, flux_times, index_times, total_time: running_time }
}

/// Encode a track's flux/index sequences back into the delta stream
/// (§4.4 "Writer"). Round-tripping `decode_track(encode_track(t))`
/// reproduces the same flux and index sequences, though not necessarily
/// byte-for-byte the original wire stream (§8 invariant 10).
pub fn encode_track(track: &DfiTrack) -> Vec<u8> {
    let mut out = Vec::new();
    let mut previous: u64 = 0;
    let mut index_iter = track.index_times.iter().peekable();

    // Indices at time 0, before any flux, emit immediately.
    while index_iter.peek().is_some_and(|&&t| t == previous) {
        out.push(0x80);
        index_iter.next();
    }

    for &time in &track.flux_times {
        let delta = time - previous;
        if delta < 0x80 {
            out.push(delta as u8);
        } else {
            let clamped = delta.min(0xFFFF) as u16;
            out.push(0xFF);
            out.extend_from_slice(&clamped.to_le_bytes());
        }
        previous = time;
        while index_iter.peek().is_some_and(|&&t| t == previous) {
            out.push(0x80);
            index_iter.next();
        }
    }
    out
}

/// Parse a full DFI stream (`"DFE2"` header + repeated `"TRK0"` track
/// records) into a list of [`DfiTrack`]s. Track order is cylinder-major,
/// head-alternating: `cylinder = index/2, head = index&1`.
pub fn parse(data: &[u8]) -> Result<Vec<DfiTrack>, Error> {
    if data.len() < 7 || data[0..4] != MAGIC {
        return Err(Error::NotDfi);
    }
    let version = endian::le16(data, 4);
    if version != 2 {
        return Err(Error::UnsupportedVersion);
    }

    let mut tracks = Vec::new();
    let mut offset = 7usize;
    let mut index = 0u32;
    while offset + TRACK_HEADER_LEN <= data.len() {
        if data[offset..offset + 4] != TRACK_MAGIC {
            break;
        }
        let length = endian::le32(data, offset + 4) as usize;
        let start = offset + TRACK_HEADER_LEN;
        let Some(stream) = data.get(start..start + length) else {
            log::warn!("track {index} claims {length} bytes past end of stream");
            return Err(Error::Truncated);
        };
        let cylinder = index / 2;
        let head = index & 1;
        tracks.push(decode_track(cylinder, head, DEFAULT_SAMPLE_RATE_HZ, stream));
        offset = start + length;
        index += 1;
    }
    Ok(tracks)
}

/// Serialize tracks back into a full DFI stream.
pub fn write(tracks: &[DfiTrack]) -> Vec<u8> {
    let mut out = Vec::with_capacity(7);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&2u16.to_le_bytes());
    out.push(0);
    for track in tracks {
        let body = encode_track(track);
        out.extend_from_slice(&TRACK_MAGIC);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s5_delta_stream_matches_scenario() {
        let stream = [10u8, 20, 0xFF, 0x00, 0x01, 0x80];
        let track = decode_track(0, 0, DEFAULT_SAMPLE_RATE_HZ, &stream);
        assert_eq!(track.flux_times, vec![10, 30, 30 + 256]);
        assert_eq!(track.index_times, vec![30 + 256]);
        assert_eq!(track.total_time, 30 + 256);
    }

    #[test]
    fn encode_decode_round_trips_sequences() {
        let original = DfiTrack {
            cylinder: 3,
            head: 1,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            flux_times: vec![5, 15, 300, 301],
            index_times: vec![15],
            total_time: 301,
        };
        let bytes = encode_track(&original);
        let decoded = decode_track(3, 1, DEFAULT_SAMPLE_RATE_HZ, &bytes);
        assert_eq!(decoded.flux_times, original.flux_times);
        assert_eq!(decoded.index_times, original.index_times);
        assert_eq!(decoded.total_time, original.total_time);
    }

    #[test]
    fn full_stream_round_trip_orders_tracks_cylinder_major() {
        let t0 = DfiTrack { cylinder: 0, head: 0, sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ, flux_times: vec![1, 2], index_times: vec![], total_time: 2 };
        let t1 = DfiTrack { cylinder: 0, head: 1, sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ, flux_times: vec![3], index_times: vec![], total_time: 3 };
        let bytes = write(&[t0.clone(), t1.clone()]);
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!((parsed[0].cylinder, parsed[0].head), (0, 0));
        assert_eq!((parsed[1].cylinder, parsed[1].head), (0, 1));
        assert_eq!(parsed[0].flux_times, t0.flux_times);
    }

    #[test]
    fn non_magic_is_rejected() {
        assert!(matches!(parse(b"nope"), Err(Error::NotDfi)));
    }
}
