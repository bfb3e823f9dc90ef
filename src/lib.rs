//! # `uft-core`
//!
//! Core engines for a retro floppy disk preservation and analysis toolkit.
//! This crate has no CLI, no GUI, and no session persistence of its own —
//! those are thin integration layers that sit on top of the engines here.
//!
//! ## Architecture
//!
//! Five engines, each usable independently:
//! * [`detect`] — multi-stage format identification (geometry, boot sector, CP/M heuristic)
//! * [`fs::cpm`] — CP/M 2.2/3.0 filesystem engine (DPB, directory, allocation, read/write)
//! * [`container::ipf`] — IPF/CAPS preservation container decoder/encoder
//! * [`container::dfi`] — DiscFerret flux container decoder/encoder
//! * [`scp`] — SuperCard Pro capture device protocol driver
//!
//! Every destructive operation across these engines is expected to be
//! routed through [`gate::WriteGate`] by the caller before it is applied.
//!
//! ## Shared primitives
//!
//! [`primitives`] holds the CRC-32, checksum, endian, and scoped-buffer
//! helpers used throughout the other modules. [`geometry`] and [`bios`]
//! hold the disk-geometry and boot-descriptor data model from the
//! specification's data model section.

pub mod primitives;
pub mod geometry;
pub mod bios;
pub mod detect;
pub mod fs;
pub mod container;
pub mod scp;
pub mod gate;

/// Boxed error type used at the boundary of nearly every public fallible
/// function, matching the convention used throughout this crate's teacher.
pub type DYNERR = Box<dyn std::error::Error>;
/// Shorthand for operations that either succeed with no payload or fail.
pub type STDRESULT = Result<(), DYNERR>;
