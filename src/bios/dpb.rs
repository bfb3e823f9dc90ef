//! ## Disk Parameter Block Module
//!
//! Disk Parameter Blocks (DPB) for CP/M disks. There is no standard for
//! storing a DPB on a CP/M disk; all we know is the BIOS must generate it
//! somehow, so the detection engine computes one heuristically from
//! geometry and a presumed block size rather than reading it off disk.

use crate::fs::cpm::types::{DIR_ENTRY_SIZE, LOGICAL_EXTENT_SIZE, RECORD_SIZE};
use log::debug;

/// The classical eleven-field CP/M Disk Parameter Block (§3), plus the
/// CP/M v3 physical-record fields (PSH, PHM) used when the physical
/// sector is larger than the 128-byte logical record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CpmDpb {
    /// Records (128 bytes) per track.
    pub spt: u16,
    /// Block shift factor: `block_size = 128 << bsh`.
    pub bsh: u8,
    /// Block mask, `2^bsh - 1`.
    pub blm: u8,
    /// Extent mask: logical extents per extent, minus 1.
    pub exm: u8,
    /// Total data blocks minus 1 (not counting reserved tracks).
    pub dsm: u16,
    /// Directory entries minus 1.
    pub drm: u16,
    /// Bitmap of directory blocks, high byte.
    pub al0: u8,
    /// Bitmap of directory blocks, low byte.
    pub al1: u8,
    /// Size of the directory check vector.
    pub cks: u16,
    /// Reserved (system) tracks; directory starts at this track.
    pub off: u16,
    /// Physical record shift factor, `log2(sector_bytes / 128)`.
    pub psh: u8,
    /// Physical record mask, `sector_bytes / 128 - 1`.
    pub phm: u8,
}

impl CpmDpb {
    /// Check that the field dependencies described in §3/§8 invariant 3
    /// are all mutually satisfied.
    pub fn verify(&self) -> bool {
        if self.bsh < 3 || self.bsh > 7 {
            debug!("BSH out of range");
            return false;
        }
        if self.blm as usize != num_traits::pow(2usize, self.bsh as usize) - 1 {
            debug!("BLM must be 2^BSH-1");
            return false;
        }
        if self.dsm > 0x7FFF {
            debug!("block count exceeds maximum");
            return false;
        }
        if self.bsh == 3 && self.dsm > 0xFF {
            debug!("block count exceeds maximum for 1K blocks");
            return false;
        }
        let bls = self.block_size();
        let max_exm = match self.dsm {
            dsm if dsm < 256 => 16 * bls / LOGICAL_EXTENT_SIZE - 1,
            _ => 8 * bls / LOGICAL_EXTENT_SIZE - 1,
        };
        if self.exm as usize > max_exm {
            debug!("too many logical extents");
            return false;
        }
        match self.exm {
            0b0 | 0b1 | 0b11 | 0b111 | 0b1111 => {}
            _ => {
                debug!("invalid extent mask {}", self.exm);
                return false;
            }
        }
        if self.drm as usize + 1 > 16 * bls / DIR_ENTRY_SIZE {
            debug!("too many directory entries");
            return false;
        }
        let mut dir_bits = 0;
        for i in 0..8 {
            dir_bits += (self.al0 >> i) & 1;
            dir_bits += (self.al1 >> i) & 1;
        }
        if dir_bits as usize != self.dir_blocks() {
            debug!("directory block map mismatch");
            return false;
        }
        if self.dir_blocks() > self.user_blocks() {
            debug!("directory occupies more blocks than exist");
            return false;
        }
        true
    }

    /// Size of a data block in bytes.
    pub fn block_size(&self) -> usize {
        (128usize) << self.bsh as usize
    }

    /// Size of a block pointer in bytes: 2 when `dsm > 255`, else 1 (§3).
    pub fn ptr_size(&self) -> usize {
        if self.dsm > 255 {
            2
        } else {
            1
        }
    }

    /// `true` when 16-bit allocation pointers are in use.
    pub fn uses_16bit_ptrs(&self) -> bool {
        self.ptr_size() == 2
    }

    /// Capacity of one full extent, in bytes.
    pub fn extent_capacity(&self) -> usize {
        (self.exm as usize + 1) * LOGICAL_EXTENT_SIZE
    }

    /// Data blocks available in total (directory + user data).
    pub fn user_blocks(&self) -> usize {
        self.dsm as usize + 1
    }

    /// Maximum directory entries.
    pub fn dir_entries(&self) -> usize {
        self.drm as usize + 1
    }

    /// Number of blocks pre-allocated to the directory, derived from the
    /// `AL0:AL1` bitmap (the high bits set, read MSB-first across both
    /// bytes) as required by §8 invariant 3.
    pub fn dir_blocks(&self) -> usize {
        (self.dir_entries() * DIR_ENTRY_SIZE).div_ceil(self.block_size())
    }

    /// Total byte capacity, accounting for reserved tracks and any unused
    /// remainder sectors on the last track. Assumes uniform track
    /// capacity across the disk (§3 disk-capacity derivation).
    pub fn disk_capacity(&self) -> usize {
        let track_capacity = self.spt as usize * RECORD_SIZE;
        let os = self.off as usize * track_capacity;
        let user = self.user_blocks() * self.block_size();
        let remainder = user % track_capacity;
        if remainder > 0 {
            os + user + track_capacity - remainder
        } else {
            os + user
        }
    }

    /// Compute a DPB heuristically from geometry, the number of reserved
    /// boot tracks, a presumed block size, and a directory-entry count
    /// (§4.1 Stage 3's "compute a DPB from (geometry, boot-tracks,
    /// block-size, directory-entries)").
    pub fn compute(
        sectors_per_track: u16,
        sector_size: usize,
        reserved_tracks: u16,
        block_size: usize,
        dir_entries: usize,
        total_data_bytes: usize,
    ) -> Self {
        let bsh = (block_size / 128).trailing_zeros() as u8;
        let blm = (1usize << bsh) as u8 - 1;
        let dsm = (total_data_bytes / block_size).saturating_sub(1) as u16;
        let drm = dir_entries.saturating_sub(1) as u16;
        let dir_blocks_needed = (dir_entries * DIR_ENTRY_SIZE).div_ceil(block_size);
        let mut al0 = 0u8;
        let mut al1 = 0u8;
        for i in 0..dir_blocks_needed.min(16) {
            if i < 8 {
                al0 |= 0x80 >> i;
            } else {
                al1 |= 0x80 >> (i - 8);
            }
        }
        let exm = if dsm < 256 {
            (16 * block_size / LOGICAL_EXTENT_SIZE).saturating_sub(1).min(15) as u8
        } else {
            (8 * block_size / LOGICAL_EXTENT_SIZE).saturating_sub(1).min(15) as u8
        };
        let spt = sectors_per_track as usize * (sector_size / RECORD_SIZE);
        let psh = if sector_size > RECORD_SIZE {
            (sector_size / 128).trailing_zeros() as u8
        } else {
            0
        };
        let phm = if sector_size > RECORD_SIZE {
            (sector_size / 128) as u8 - 1
        } else {
            0
        };
        Self {
            spt: spt as u16,
            bsh,
            blm,
            exm,
            dsm,
            drm,
            al0,
            al1,
            cks: if dir_entries > 0 { ((dir_entries + 3) / 4) as u16 } else { 0 },
            off: reserved_tracks,
            psh,
            phm,
        }
    }
}

/// A well-known DPB for the 8-inch, 77-track, single-density IBM format
/// that the original CP/M 1.x ran on (SD8/CPM1 floppy), kept as a
/// reference point when a provisional candidate's geometry matches it
/// exactly.
pub const CPM1_SD8: CpmDpb = CpmDpb {
    spt: 26,
    bsh: 3,
    blm: 7,
    exm: 0,
    dsm: 242,
    drm: 63,
    al0: 0b11000000,
    al1: 0b00000000,
    cks: 16,
    off: 2,
    psh: 0,
    phm: 0,
};

/// Well-known DPB for the Osborne 1's 5.25-inch single-density format.
pub const OSBORNE1: CpmDpb = CpmDpb {
    spt: 40,
    bsh: 3,
    blm: 7,
    exm: 0,
    dsm: 184,
    drm: 63,
    al0: 0b11000000,
    al1: 0b00000000,
    cks: 16,
    off: 3,
    psh: 0,
    phm: 0,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_dpbs_verify() {
        assert!(CPM1_SD8.verify());
        assert!(OSBORNE1.verify());
    }

    #[test]
    fn block_size_matches_bsh() {
        assert_eq!(CPM1_SD8.block_size(), 1024);
        assert_eq!(CPM1_SD8.blm, 7);
    }

    #[test]
    fn ptr_size_depends_on_dsm() {
        assert_eq!(CPM1_SD8.ptr_size(), 1);
        let big = CpmDpb { dsm: 1000, ..CPM1_SD8 };
        assert_eq!(big.ptr_size(), 2);
        assert!(big.uses_16bit_ptrs());
    }

    #[test]
    fn computed_dpb_for_kaypro_like_geometry() {
        // 40 tracks x 1 head x 10 sectors x 512 bytes, 2 reserved tracks,
        // 1024-byte blocks, 64 directory entries.
        let total = 40usize * 10 * 512;
        let dpb = CpmDpb::compute(10, 512, 2, 1024, 64, total - 2 * 10 * 512);
        assert_eq!(dpb.block_size(), 1024);
        assert!(dpb.dir_blocks() <= dpb.user_blocks());
    }
}
