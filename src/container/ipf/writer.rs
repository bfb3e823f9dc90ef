//! Writer: emit CAPS + INFO + (IMGE + DATA)* with computed CRCs. Does
//! not regenerate SPS element streams from a CAPS-style model — an SPS
//! image round-trips only by carrying its raw block-descriptor bytes
//! verbatim (§4.3 "Writer").

use super::info::InfoRecord;
use super::record::{self, TAG_CAPS, TAG_DATA, TAG_IMGE, TAG_INFO};

pub struct IpfWriter {
    buf: Vec<u8>,
    header_written: bool,
}

impl IpfWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new(), header_written: false }
    }

    /// Emit the mandatory first record: CAPS with a zero-length payload.
    pub fn write_header(&mut self) {
        self.buf.extend_from_slice(&record::encode(TAG_CAPS, &[]));
        self.header_written = true;
    }

    pub fn add_info(&mut self, info: &InfoRecord) {
        self.buf.extend_from_slice(&record::encode(TAG_INFO, &info.to_bytes()));
    }

    /// Add a raw record by tag — used for IMGE/DATA (already-serialized
    /// by their own `to_bytes`) and for any record kind this writer does
    /// not special-case.
    pub fn add_record(&mut self, tag: [u8; 4], payload: &[u8]) {
        self.buf.extend_from_slice(&record::encode(tag, payload));
    }

    pub fn add_image(&mut self, payload: &[u8]) {
        self.add_record(TAG_IMGE, payload);
    }

    pub fn add_data(&mut self, payload: &[u8]) {
        self.add_record(TAG_DATA, payload);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }
}

impl Default for IpfWriter {
    fn default() -> Self {
        Self::new()
    }
}
