//! ## CP/M file system module
//!
//! CP/M spans a broad space of vintage hardware and disk formats; every
//! disk is described by a Disk Parameter Block ([`CpmDpb`]), which in a
//! real CP/M system lived in BIOS or was generated on the fly — here the
//! engine simply takes ownership of one supplied by the caller (usually
//! the detection engine's Stage 3).
//!
//! Four units of quantization recur throughout this module: records of
//! 128 bytes, blocks of 1K–16K (DPB-dependent), logical extents of 16K,
//! and file extents whose capacity is `(EXM+1) * 16K`.

pub mod types;
pub mod directory;
pub mod display;
pub mod pack;

use std::collections::BTreeSet;

use bit_vec::BitVec;

use crate::bios::dpb::CpmDpb;
use crate::fs::{Attributes, SectorCallback};
use crate::geometry::DiskGeometry;
use directory::{Directory, Extent};
use types::{Error, Ptr, DIR_ENTRY_SIZE, RECORD_SIZE};

/// A file as the caller sees it: its user area, canonical name, total
/// size, attribute bits, and the directory slots backing it (§3
/// `CpmFile`).
#[derive(Clone, Debug)]
pub struct CpmFile {
    pub user: u8,
    pub name: String,
    pub size: usize,
    pub attributes: Attributes,
    pub extents: Vec<Ptr>,
}

/// The CP/M disk engine: owns a [`CpmDpb`], a sector callback, and the
/// in-memory directory plus allocation bitmap derived from it at open
/// time (§4.2).
pub struct CpmDisk<C: SectorCallback> {
    dpb: CpmDpb,
    geometry: DiskGeometry,
    callback: C,
    read_only: bool,
    directory: Directory,
    allocation: BitVec,
    dirty: bool,
}

impl<C: SectorCallback> CpmDisk<C> {
    /// Open a disk: verify the DPB, read the directory through the
    /// callback, and derive the allocation bitmap from the live entries
    /// found there. `read_only` models "write_cb may be absent" from §4.2
    /// — attempting a write-path operation on a read-only mount fails
    /// with [`Error::Unsupported`] rather than ever invoking the
    /// callback's `write`.
    pub fn open(
        geometry: DiskGeometry,
        dpb: CpmDpb,
        callback: C,
        read_only: bool,
    ) -> Result<Self, Error> {
        if !dpb.verify() {
            return Err(Error::BadDir);
        }
        let mut disk = Self {
            dpb,
            geometry,
            callback,
            read_only,
            directory: Directory::new(),
            allocation: BitVec::new(),
            dirty: false,
        };
        disk.directory = disk.read_directory_raw()?;
        disk.rebuild_allocation();
        Ok(disk)
    }

    /// Map a CP/M logical-record index to a physical `(cylinder, head,
    /// sector, offset)` quadruple. Tracks are numbered `cylinder * heads
    /// + head`; this is an internal convention, not a skew table — actual
    /// sector interleave is out of scope (§1 Non-goals).
    fn record_location(&self, record_index: usize) -> (usize, usize, usize, usize) {
        let spt = self.dpb.spt as usize;
        let track = record_index / spt;
        let rec_in_track = record_index % spt;
        let records_per_sector = self.geometry.sector_size() as usize / RECORD_SIZE;
        let sector_in_track = rec_in_track / records_per_sector;
        let offset = (rec_in_track % records_per_sector) * RECORD_SIZE;
        let heads = self.geometry.heads().max(1) as usize;
        let cylinder = track / heads;
        let head = track % heads;
        let sector = self.geometry.first_sector_id() as usize + sector_in_track;
        (cylinder, head, sector, offset)
    }

    fn read_block(&mut self, block_index: usize) -> Result<Vec<u8>, Error> {
        let block_size = self.dpb.block_size();
        let records_per_block = block_size / RECORD_SIZE;
        let base_record = self.dpb.off as usize * self.dpb.spt as usize + block_index * records_per_block;
        let mut out = vec![0u8; block_size];
        let mut sector_cache: Option<(usize, usize, usize, Vec<u8>)> = None;
        for r in 0..records_per_block {
            let (cyl, head, sector, offset) = self.record_location(base_record + r);
            if sector_cache
                .as_ref()
                .map(|(c, h, s, _)| (*c, *h, *s) != (cyl, head, sector))
                .unwrap_or(true)
            {
                let mut buf = vec![0u8; self.geometry.sector_size() as usize];
                self.callback
                    .read(cyl, head, sector, &mut buf)
                    .map_err(|_| Error::ReadError)?;
                sector_cache = Some((cyl, head, sector, buf));
            }
            let (_, _, _, buf) = sector_cache.as_ref().unwrap();
            out[r * RECORD_SIZE..(r + 1) * RECORD_SIZE].copy_from_slice(&buf[offset..offset + RECORD_SIZE]);
        }
        Ok(out)
    }

    fn write_block(&mut self, block_index: usize, data: &[u8]) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::Unsupported);
        }
        let block_size = self.dpb.block_size();
        let records_per_block = block_size / RECORD_SIZE;
        let base_record = self.dpb.off as usize * self.dpb.spt as usize + block_index * records_per_block;
        for r in 0..records_per_block {
            let (cyl, head, sector, offset) = self.record_location(base_record + r);
            let records_per_sector = self.geometry.sector_size() as usize / RECORD_SIZE;
            let mut buf = vec![0u8; self.geometry.sector_size() as usize];
            if records_per_sector > 1 {
                self.callback
                    .read(cyl, head, sector, &mut buf)
                    .map_err(|_| Error::ReadError)?;
            }
            buf[offset..offset + RECORD_SIZE].copy_from_slice(&data[r * RECORD_SIZE..(r + 1) * RECORD_SIZE]);
            self.callback
                .write(cyl, head, sector, &buf)
                .map_err(|_| Error::WriteError)?;
        }
        Ok(())
    }

    fn read_directory_raw(&mut self) -> Result<Directory, Error> {
        let mut buf = Vec::with_capacity(self.dpb.dir_blocks() * self.dpb.block_size());
        for iblock in 0..self.dpb.dir_blocks() {
            buf.extend(self.read_block(iblock)?);
        }
        buf.truncate(self.dpb.dir_entries() * DIR_ENTRY_SIZE);
        Ok(Directory::from_bytes(&buf))
    }

    fn rebuild_allocation(&mut self) {
        let mut bits = BitVec::from_elem(self.dpb.user_blocks(), false);
        for i in 0..self.dpb.dir_blocks().min(self.dpb.user_blocks()) {
            bits.set(i, true);
        }
        for i in 0..self.directory.num_entries() {
            if self.directory.entry_type(Ptr::DirSlot(i)) == types::EntryType::File {
                let x = self.directory.get(Ptr::DirSlot(i));
                for ptr in x.block_list(&self.dpb) {
                    if (ptr as usize) < bits.len() {
                        bits.set(ptr as usize, true);
                    }
                }
            }
        }
        self.allocation = bits;
    }

    fn free_blocks(&self) -> usize {
        self.allocation.iter().filter(|b| !b).count()
    }

    fn allocate_block(&mut self) -> Option<usize> {
        for (i, used) in self.allocation.iter().enumerate() {
            if !used {
                self.allocation.set(i, true);
                return Some(i);
            }
        }
        None
    }

    fn free_block(&mut self, block: usize) {
        if block < self.allocation.len() {
            self.allocation.set(block, false);
        }
    }

    /// Distinct user numbers with at least one live file (§1 item 2,
    /// supplementing §4.2's lifecycle with a `users()` query).
    pub fn users(&self) -> Vec<u8> {
        let mut seen = BTreeSet::new();
        for i in 0..self.directory.num_entries() {
            if self.directory.entry_type(Ptr::DirSlot(i)) == types::EntryType::File {
                seen.insert(self.directory.get(Ptr::DirSlot(i)).user);
            }
        }
        seen.into_iter().collect()
    }

    /// Traverse the directory and group extents sharing `(user, name,
    /// ext)` into [`CpmFile`] aggregates (§4.2 `read_directory`).
    pub fn read_directory(&self) -> Vec<CpmFile> {
        use std::collections::BTreeMap;
        let mut groups: BTreeMap<(u8, [u8; 8], [u8; 3]), Vec<(usize, Extent)>> = BTreeMap::new();
        for i in 0..self.directory.num_entries() {
            if self.directory.entry_type(Ptr::DirSlot(i)) == types::EntryType::File {
                let x = self.directory.get(Ptr::DirSlot(i));
                groups.entry((x.user, x.name, x.ext)).or_default().push((i, x));
            }
        }
        let mut out = Vec::new();
        for ((user, _name, _ext), mut members) in groups {
            members.sort_by_key(|(_, x)| x.logical_extent_number());
            let size = members.last().map(|(_, x)| x.eof()).unwrap_or(0);
            let first = &members[0].1;
            out.push(CpmFile {
                user,
                name: first.display_name(),
                size,
                attributes: first.attributes(),
                extents: members.iter().map(|(i, _)| Ptr::DirSlot(*i)).collect(),
            });
        }
        out
    }

    /// Look up a file by name. `user == 0xFF` matches the first
    /// occurrence under any user (§4.2, §8 boundary case).
    pub fn find_file(&self, user: u8, name: &str) -> Option<CpmFile> {
        let upper = name.to_uppercase();
        self.read_directory()
            .into_iter()
            .find(|f| (user == 0xFF || f.user == user) && f.name == upper)
    }

    /// Concatenate a file's data from its extents' block pointers,
    /// trimmed to the size recorded in the directory.
    pub fn read_file(&mut self, user: u8, name: &str) -> Result<Vec<u8>, Error> {
        let file = self.find_file(user, name).ok_or(Error::NotFound)?;
        let mut data = Vec::with_capacity(file.size);
        for ptr in &file.extents {
            let x = self.directory.get(*ptr);
            for block in x.block_list(&self.dpb) {
                // Block 0 always belongs to the pre-allocated directory
                // area and is never handed out by `allocate_block`, so it
                // doubles as the "unused pointer slot" sentinel.
                if block == 0 {
                    continue;
                }
                data.extend(self.read_block(block as usize)?);
            }
        }
        data.truncate(file.size);
        Ok(data)
    }

    /// Write `data` as a new file (§4.2 write path): canonicalise the
    /// name, verify free space, allocate blocks, chain extents (up to 16
    /// pointers each), and mark the directory dirty for [`Self::sync`].
    pub fn write_file(&mut self, user: u8, name: &str, data: &[u8]) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::Unsupported);
        }
        if self.find_file(user, name).is_some() {
            return Err(Error::Exists);
        }
        let (base, ext) = pack::canonicalize_name(name)?;
        let block_size = self.dpb.block_size();
        let required_blocks = data.len().div_ceil(block_size).max(1);
        if required_blocks > self.free_blocks() {
            return Err(Error::DiskFull);
        }
        let ptrs_per_extent = 16.min(self.dpb.extent_capacity() / block_size).max(1);
        let mut allocated = Vec::with_capacity(required_blocks);
        for chunk_idx in 0..required_blocks {
            let block = self.allocate_block().ok_or(Error::DiskFull)?;
            let chunk = if (chunk_idx + 1) * block_size <= data.len() {
                &data[chunk_idx * block_size..(chunk_idx + 1) * block_size]
            } else {
                &data[chunk_idx * block_size..]
            };
            let mut padded = vec![0u8; block_size];
            padded[..chunk.len()].copy_from_slice(chunk);
            self.write_block(block, &padded)?;
            allocated.push(block as u16);
        }
        for (extent_idx, chunk) in allocated.chunks(ptrs_per_extent).enumerate() {
            let slot = self.find_free_slot().ok_or(Error::DiskFull)?;
            let mut x = Extent {
                user,
                name: base,
                ext,
                ex: 0,
                s1: 0,
                s2: 0,
                rc: 0,
                allocation: [0; 16],
            };
            x.set_logical_extent_number(extent_idx);
            let is_last = extent_idx == allocated.len().div_ceil(ptrs_per_extent) - 1;
            let bytes_in_extent = if is_last {
                data.len() - extent_idx * ptrs_per_extent * block_size
            } else {
                ptrs_per_extent * block_size
            };
            let records = bytes_in_extent.div_ceil(RECORD_SIZE);
            x.rc = records.min(0x80) as u8;
            x.s1 = (bytes_in_extent % RECORD_SIZE) as u8;
            x.set_block_list(chunk, &self.dpb);
            self.directory.set(slot, &x);
        }
        self.dirty = true;
        Ok(())
    }

    fn find_free_slot(&self) -> Option<Ptr> {
        (0..self.directory.num_entries())
            .map(Ptr::DirSlot)
            .find(|&p| matches!(self.directory.entry_type(p), types::EntryType::Deleted | types::EntryType::Unknown))
    }

    /// Mark every extent of a file deleted and return its blocks to free
    /// (§4.2 `delete_file`).
    pub fn delete_file(&mut self, user: u8, name: &str) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::Unsupported);
        }
        let file = self.find_file(user, name).ok_or(Error::NotFound)?;
        for ptr in &file.extents {
            let x = self.directory.get(*ptr);
            for block in x.block_list(&self.dpb) {
                self.free_block(block as usize);
            }
            self.directory.mark_deleted(*ptr);
        }
        self.dirty = true;
        Ok(())
    }

    /// Rename every extent of a file, failing if the new name collides
    /// with an existing file for the same user (§4.2 `rename_file`).
    pub fn rename_file(&mut self, user: u8, old_name: &str, new_name: &str) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::Unsupported);
        }
        if self.find_file(user, new_name).is_some() {
            return Err(Error::Exists);
        }
        let (base, ext) = pack::canonicalize_name(new_name)?;
        let file = self.find_file(user, old_name).ok_or(Error::NotFound)?;
        for ptr in &file.extents {
            let mut x = self.directory.get(*ptr);
            x.name = base;
            x.ext = ext;
            self.directory.set(*ptr, &x);
        }
        self.dirty = true;
        Ok(())
    }

    /// Set read-only/system/archived attributes across every extent of a
    /// file (§4.2 `set_attributes`).
    pub fn set_attributes(&mut self, user: u8, name: &str, attrs: Attributes) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::Unsupported);
        }
        let file = self.find_file(user, name).ok_or(Error::NotFound)?;
        for ptr in &file.extents {
            let mut x = self.directory.get(*ptr);
            x.set_attributes(attrs);
            self.directory.set(*ptr, &x);
        }
        self.dirty = true;
        Ok(())
    }

    /// Free space in bytes (§4.2 `free_space`).
    pub fn free_space(&self) -> usize {
        self.free_blocks() * self.dpb.block_size()
    }

    /// Initialise an empty volume: every data block filled with the
    /// deleted-entry byte (§4.2 `format`).
    pub fn format(&mut self) -> Result<(), Error> {
        if self.read_only {
            return Err(Error::Unsupported);
        }
        let fill = vec![types::DELETED; self.dpb.block_size()];
        for block in 0..self.dpb.user_blocks() {
            self.write_block(block, &fill)?;
        }
        self.directory = Directory::from_bytes(&vec![types::DELETED; self.dpb.dir_entries() * DIR_ENTRY_SIZE]);
        self.rebuild_allocation();
        self.dirty = false;
        Ok(())
    }

    /// Flush dirty directory sectors through the write callback (§4.2
    /// `sync`). Per §5's crash-safety invariant, data blocks are always
    /// written before this is called, so a crash mid-sync can at worst
    /// leave allocated-but-unreferenced blocks, never the reverse.
    pub fn sync(&mut self) -> Result<(), Error> {
        if !self.dirty {
            return Ok(());
        }
        if self.read_only {
            return Err(Error::Unsupported);
        }
        let buf = self.directory.to_bytes();
        let block_size = self.dpb.block_size();
        for iblock in 0..self.dpb.dir_blocks() {
            let start = iblock * block_size;
            let end = (start + block_size).min(buf.len());
            let mut chunk = vec![0u8; block_size];
            chunk[..end - start].copy_from_slice(&buf[start..end]);
            self.write_block(iblock, &chunk)?;
        }
        self.dirty = false;
        Ok(())
    }
}
