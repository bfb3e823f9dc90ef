//! # File System Module
//!
//! Sector-level storage is abstracted behind [`SectorCallback`] so that a
//! filesystem engine never needs to know whether it is backed by a file
//! on disk, an in-memory image, or a live capture device. The engine
//! holds its callback by value alongside its own state (§9: "sector
//! callbacks are passed as explicit values, not globals").

pub mod cpm;

/// Host-provided sector I/O, decoupling filesystem logic from the
/// storage medium (§6 "Sector-callback interface"). `sector` is relative
/// to the geometry's `first_sector_id`. The callback owns the buffers it
/// is handed; a `SectorCallback` implementor never retains them past the
/// call.
pub trait SectorCallback {
    type Error: std::error::Error + 'static;

    /// Read one physical sector into `buf`. `buf.len()` is always the
    /// geometry's sector size.
    fn read(&mut self, cylinder: usize, head: usize, sector: usize, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write one physical sector from `buf`. Returns `Unsupported`-style
    /// errors at the call site when the implementor is read-only; the
    /// engines treat the absence of a working write path as a read-only
    /// mount rather than probing this method's existence directly.
    fn write(&mut self, cylinder: usize, head: usize, sector: usize, buf: &[u8]) -> Result<(), Self::Error>;
}

/// File attribute bits shared by CP/M-family filesystems (§4.2
/// "Attributes"): read-only, system, archived, each encoded in bit 7 of
/// one of the first three bytes following the file name on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    pub read_only: bool,
    pub system: bool,
    pub archived: bool,
}
