//! Stage 1 — geometry resolution from image size alone (§4.1).

use crate::geometry::DiskGeometry;

/// Match `image_size` against the closed table of known disk sizes, with
/// a fallback divisibility probe for generic PC geometries.
pub fn resolve(image_size: usize) -> Option<DiskGeometry> {
    match image_size {
        901_120 => Some(DiskGeometry::new(512, 11, 2, 80, 0)),
        1_474_560 => Some(DiskGeometry::new(512, 18, 2, 80, 1)),
        737_280 => Some(DiskGeometry::new(512, 9, 2, 80, 1)),
        174_848 => Some(DiskGeometry::new(256, 17, 1, 35, 0)),
        204_800 => Some(DiskGeometry::new(512, 10, 1, 40, 1)),
        _ => fallback_pc_geometry(image_size),
    }
}

fn fallback_pc_geometry(image_size: usize) -> Option<DiskGeometry> {
    for spt in [18u32, 9, 15, 36] {
        let track_bytes = 512 * spt as usize;
        if image_size % track_bytes == 0 {
            let tracks = image_size / track_bytes;
            if tracks % 2 == 0 && tracks / 2 <= 85 {
                return Some(DiskGeometry::new(512, spt, 2, (tracks / 2) as u32, 1));
            }
        }
    }
    None
}
