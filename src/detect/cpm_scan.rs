//! Stage 3 — CP/M directory-scan heuristic (§4.1). Only runs when a
//! sector-read callback is supplied; a read failure curtails this stage
//! without discarding whatever Stage 2 already found.

use crate::bios::dpb::CpmDpb;
use crate::fs::SectorCallback;
use crate::geometry::{CandidateDetail, DetectionResult, DiskGeometry, FormatCandidate};

const ENTRY_SIZE: usize = 32;
const CANDIDATE_SCAN_BYTES_MIN: usize = 4096;
const CANDIDATE_SCAN_BYTES_MAX: usize = 32768;
const EXTENSION_FAMILY: [&str; 10] = ["COM", "SUB", "TXT", "BAS", "ASM", "PRL", "REL", "DOC", "HEX", "LIB"];

struct Scored {
    total_score: i32,
    valid: usize,
    deleted: usize,
    bad: usize,
    entries: usize,
    extensions_seen: std::collections::BTreeSet<&'static str>,
}

impl Scored {
    fn valid_ratio(&self) -> f64 {
        let denom = (self.valid + self.deleted + self.bad) as f64;
        if denom == 0.0 {
            0.0
        } else {
            (self.valid + self.deleted) as f64 / denom
        }
    }

    fn avg_score(&self) -> f64 {
        if self.entries == 0 {
            0.0
        } else {
            self.total_score as f64 / self.entries as f64
        }
    }

    fn confidence(&self) -> u8 {
        let ratio = self.valid_ratio();
        let avg = self.avg_score();
        let base: u8 = if ratio > 0.9 && avg > 3.0 {
            90
        } else if ratio > 0.8 && avg > 2.0 {
            75
        } else if ratio > 0.6 && avg > 1.0 {
            55
        } else if ratio > 0.4 {
            35
        } else if ratio > 0.2 {
            20
        } else {
            0
        };
        let bonus = (self.extensions_seen.len() as u32 * 3).min(100 - base as u32) as u8;
        base.saturating_add(bonus)
    }
}

fn score_entry(entry: &[u8; ENTRY_SIZE], scored: &mut Scored) {
    scored.entries += 1;
    let user = entry[0];
    let mut score: i32 = 0;

    if user == 0xE5 {
        let printable_name = entry[1..9].iter().all(|&b| (0x20..0x7F).contains(&b));
        if printable_name {
            score += 3;
        }
        scored.deleted += 1;
        scored.total_score += score;
        return;
    }
    if entry.iter().all(|&b| b == 0) {
        scored.deleted += 1;
        scored.total_score += 2;
        return;
    }
    if user > 31 {
        scored.bad += 1;
        scored.total_score -= 8;
        return;
    }
    if entry[17..32].iter().all(|&b| b == 0xFF) {
        scored.bad += 1;
        scored.total_score -= 8;
        return;
    }

    let name_ok = entry[1..9].iter().all(|&b| (b & 0x7F).is_ascii_alphanumeric());
    if name_ok {
        score += 3;
    }
    let ext_bytes: Vec<u8> = entry[9..12].iter().map(|&b| b & 0x7F).collect();
    let ext_ok = ext_bytes.iter().all(|&b| b.is_ascii_alphanumeric() || b == b' ');
    if ext_ok {
        score += 2;
        let ext: String = ext_bytes
            .iter()
            .filter(|&&b| b != b' ')
            .map(|&b| b as char)
            .collect::<String>()
            .to_uppercase();
        if let Some(known) = EXTENSION_FAMILY.iter().find(|&&e| e == ext) {
            scored.extensions_seen.insert(known);
        }
    }
    let ex = entry[12];
    if ex <= 31 {
        score += 1;
    }
    let s1 = entry[13];
    if s1 == 0 {
        score += 1;
    }
    let rc = entry[15];
    if rc <= 128 {
        score += 1;
    }
    scored.valid += 1;
    scored.total_score += score;
}

fn read_candidate_window<C: SectorCallback>(
    callback: &mut C,
    geometry: &DiskGeometry,
    boot_track_offset: u32,
) -> Option<Vec<u8>> {
    let sector_size = geometry.sector_size() as usize;
    let want = CANDIDATE_SCAN_BYTES_MAX.max(CANDIDATE_SCAN_BYTES_MIN);
    let sectors_needed = want.div_ceil(sector_size);
    let spt = geometry.sectors_per_track() as usize;
    let heads = geometry.heads() as usize;
    if spt == 0 || heads == 0 {
        return None;
    }

    let mut out = Vec::with_capacity(sectors_needed * sector_size);
    let mut logical = boot_track_offset as usize * spt;
    for _ in 0..sectors_needed {
        let track = logical / spt;
        let sector_in_track = logical % spt;
        let cylinder = track / heads;
        let head = track % heads;
        let mut buf = vec![0u8; sector_size];
        if callback.read(cylinder, head, sector_in_track, &mut buf).is_err() {
            break;
        }
        out.extend_from_slice(&buf);
        logical += 1;
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn geometry_fingerprint(geometry: &DiskGeometry) -> &'static str {
    match (geometry.cylinders(), geometry.heads(), geometry.sectors_per_track(), geometry.sector_size()) {
        (40, 1, 10, 512) => "CPM-Kaypro",
        (40, 1, 5, 1024) => "CPM-Osborne",
        (40, 2, 9, 512) => "CPM-Amstrad",
        (77, 1, 26, 128) => "CPM-IBM8-SD",
        (35, 1, _, 256) => "CPM-C128",
        _ => "CPM-generic",
    }
}

/// Scan the CP/M directory area at each candidate boot-track offset and
/// push the best-scoring result, refined by geometry fingerprint.
pub fn scan<C: SectorCallback>(callback: &mut C, geometry: &DiskGeometry, result: &mut DetectionResult) {
    let mut best: Option<(u32, Scored)> = None;

    for offset in 0u32..=3 {
        let Some(window) = read_candidate_window(callback, geometry, offset) else {
            continue;
        };
        let mut scored = Scored {
            total_score: 0,
            valid: 0,
            deleted: 0,
            bad: 0,
            entries: 0,
            extensions_seen: std::collections::BTreeSet::new(),
        };
        for chunk in window.chunks_exact(ENTRY_SIZE) {
            let mut entry = [0u8; ENTRY_SIZE];
            entry.copy_from_slice(chunk);
            score_entry(&entry, &mut scored);
        }
        let better = match &best {
            None => true,
            Some((_, b)) => scored.confidence() > b.confidence(),
        };
        if better {
            best = Some((offset, scored));
        }
    }

    let Some((offset, scored)) = best else {
        log::debug!("no candidate boot-track offset produced a readable directory window");
        return;
    };
    let confidence = scored.confidence();
    if confidence == 0 {
        log::debug!("best offset {offset} scored zero confidence, discarding");
        return;
    }

    let mut kind = geometry_fingerprint(geometry);
    let mut conf = confidence;
    if kind == "CPM-C128" {
        conf = conf.saturating_add(3).min(100);
    }
    if kind == "CPM-generic" {
        kind = "CPM-generic";
    }

    let block_size = if geometry.sector_size() >= 1024 { geometry.sector_size() as usize } else { 1024 };
    let total_bytes = geometry.disk_size() as usize;
    let dpb = CpmDpb::compute(
        geometry.sectors_per_track() as u16,
        geometry.sector_size() as usize,
        offset as u16,
        block_size,
        64,
        total_bytes,
    );

    result.push_candidate(
        FormatCandidate::new(
            kind,
            conf,
            format!(
                "CP/M directory scan at boot-track offset {offset} (valid_ratio={:.2}, avg_score={:.2})",
                scored.valid_ratio(),
                scored.avg_score()
            ),
            kind,
        )
        .with_detail(CandidateDetail::Cpm { dpb, boot_track_offset: offset }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::DiskGeometry;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, thiserror::Error)]
    #[error("mock read failure")]
    struct MockError;

    struct MemDisk {
        data: Rc<RefCell<Vec<u8>>>,
        sector_size: usize,
        spt: usize,
        heads: usize,
    }

    impl SectorCallback for MemDisk {
        type Error = MockError;
        fn read(&mut self, cylinder: usize, head: usize, sector: usize, buf: &mut [u8]) -> Result<(), MockError> {
            let track = cylinder * self.heads + head;
            let logical = track * self.spt + sector;
            let start = logical * self.sector_size;
            let data = self.data.borrow();
            if start + self.sector_size > data.len() {
                return Err(MockError);
            }
            buf.copy_from_slice(&data[start..start + self.sector_size]);
            Ok(())
        }
        fn write(&mut self, _c: usize, _h: usize, _s: usize, _buf: &[u8]) -> Result<(), MockError> {
            Err(MockError)
        }
    }

    fn make_entry(user: u8, name: &str, ext: &str, ex: u8, s1: u8, rc: u8) -> [u8; ENTRY_SIZE] {
        let mut e = [0u8; ENTRY_SIZE];
        e[0] = user;
        let name_bytes = name.as_bytes();
        for i in 0..8 {
            e[1 + i] = *name_bytes.get(i).unwrap_or(&b' ');
        }
        let ext_bytes = ext.as_bytes();
        for i in 0..3 {
            e[9 + i] = *ext_bytes.get(i).unwrap_or(&b' ');
        }
        e[12] = ex;
        e[13] = s1;
        e[15] = rc;
        e
    }

    #[test]
    fn plausible_cpm_directory_scores_high_confidence() {
        let geometry = DiskGeometry::new(512, 10, 1, 40, 0);
        let mut data = vec![0u8; geometry.disk_size() as usize];
        let dir_start = 0;
        let entries = [
            make_entry(0, "HELLO", "COM", 0, 0, 10),
            make_entry(0, "WORLD", "TXT", 0, 0, 5),
            make_entry(0xE5, "GONE", "BAK", 0, 0, 1),
        ];
        for (i, e) in entries.iter().enumerate() {
            data[dir_start + i * ENTRY_SIZE..dir_start + (i + 1) * ENTRY_SIZE].copy_from_slice(e);
        }
        let mut disk = MemDisk { data: Rc::new(RefCell::new(data)), sector_size: 512, spt: 10, heads: 1 };
        let mut result = DetectionResult::new(geometry);
        scan(&mut disk, &geometry, &mut result);
        assert!(result.best_confidence().unwrap() > 0);
        assert_eq!(geometry_fingerprint(&geometry), "CPM-Kaypro");
    }

    #[test]
    fn read_failure_leaves_result_empty_not_panicking() {
        let geometry = DiskGeometry::new(512, 10, 1, 40, 0);
        let mut disk = MemDisk { data: Rc::new(RefCell::new(Vec::new())), sector_size: 512, spt: 10, heads: 1 };
        let mut result = DetectionResult::new(geometry);
        scan(&mut disk, &geometry, &mut result);
        assert!(result.best().is_none());
    }
}
