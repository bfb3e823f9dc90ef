//! # Format-Detection Engine (§4.1)
//!
//! Three stages, each strictly additive to the last: geometry resolution,
//! boot-sector analysis, and (when a sector-read callback is supplied) a
//! CP/M directory heuristic. Never fails on arbitrary input — an
//! unrecognised image simply yields a [`DetectionResult`] with zero
//! candidates.

mod boot_sector;
mod cpm_scan;
mod geometry_table;

use crate::fs::SectorCallback;
use crate::geometry::{DetectionResult, DiskGeometry};

/// Closed error taxonomy for the detection engine (§7).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("required parameter was null")]
    NullParam,
    #[error("no data supplied")]
    NoData,
    #[error("sector index out of range")]
    InvalidSector,
    #[error("sector read failed")]
    ReadFailed,
    #[error("data is not MFM-decodable")]
    NotMfm,
    #[error("format could not be determined")]
    UnknownFormat,
    #[error("allocation failed")]
    AllocFailed,
    #[error("BIOS parameter block is invalid")]
    InvalidBpb,
    #[error("directory structure is corrupt")]
    CorruptDir,
}

/// Run the full three-stage pipeline against `image`. `geometry_hint`, if
/// given, is authoritative and skips Stage 1. `callback`, if given,
/// enables Stage 3's directory scan.
pub fn detect<C: SectorCallback>(
    image: &[u8],
    geometry_hint: Option<DiskGeometry>,
    mut callback: Option<&mut C>,
) -> Result<DetectionResult, Error> {
    if image.is_empty() {
        return Err(Error::NoData);
    }
    let geometry = match geometry_hint {
        Some(g) => g,
        None => geometry_table::resolve(image.len()).ok_or_else(|| {
            log::warn!("no geometry hint and {} bytes matched no known size", image.len());
            Error::UnknownFormat
        })?,
    };
    let mut result = DetectionResult::new(geometry);
    let exclusive = boot_sector::analyze(image, &geometry, &mut result);
    log::debug!("stage 2 exclusive={exclusive}, {} candidates so far", result.candidates().len());

    if !exclusive {
        if let Some(cb) = callback.as_deref_mut() {
            cpm_scan::scan(cb, &geometry, &mut result);
        }
    } else {
        log::debug!("stage 2 match was exclusive, skipping stage 3");
    }
    Ok(result)
}

pub use boot_sector::analyze as analyze_boot_sector;
pub use cpm_scan::scan as scan_cpm_directory;
pub use geometry_table::resolve as resolve_geometry;
