//! Disk geometry and detection result types (§3). These are the data
//! model the detection engine produces and every other engine consumes;
//! they carry no behavior of their own beyond small derived accessors.

/// Physical geometry of a disk image. Immutable once constructed — every
/// caller gets a read-only view, matching the teacher's own `ImageBlock`
/// coordinate handling in `img::Block`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskGeometry {
    sector_size: u32,
    sectors_per_track: u32,
    heads: u32,
    cylinders: u32,
    first_sector_id: u32,
}

impl DiskGeometry {
    /// Construct a geometry. `sector_size` must be a power of two in
    /// 128..=8192 per §3; callers that violate this get a panic rather
    /// than a silently-wrong geometry, since a geometry is meant to be
    /// authoritative once built.
    pub fn new(
        sector_size: u32,
        sectors_per_track: u32,
        heads: u32,
        cylinders: u32,
        first_sector_id: u32,
    ) -> Self {
        assert!(
            sector_size.is_power_of_two() && (128..=8192).contains(&sector_size),
            "sector_size must be a power of two in 128..=8192"
        );
        Self {
            sector_size,
            sectors_per_track,
            heads,
            cylinders,
            first_sector_id,
        }
    }

    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }
    pub fn sectors_per_track(&self) -> u32 {
        self.sectors_per_track
    }
    pub fn heads(&self) -> u32 {
        self.heads
    }
    pub fn cylinders(&self) -> u32 {
        self.cylinders
    }
    pub fn first_sector_id(&self) -> u32 {
        self.first_sector_id
    }

    /// Total sectors across the whole disk.
    pub fn total_sectors(&self) -> u64 {
        self.cylinders as u64 * self.heads as u64 * self.sectors_per_track as u64
    }

    /// Total disk size in bytes.
    pub fn disk_size(&self) -> u64 {
        self.total_sectors() * self.sector_size as u64
    }
}

/// A single candidate filesystem/container identification, as produced by
/// the detection engine's stages.
#[derive(Clone, Debug, PartialEq)]
pub struct FormatCandidate {
    pub filesystem_kind: String,
    /// 0..=100.
    pub confidence: u8,
    pub description: String,
    pub machine_hint: String,
    pub detail: CandidateDetail,
}

/// Kind-specific detail carried alongside a [`FormatCandidate`], replacing
/// what would otherwise be a kind-keyed `switch` over opaque fields (see
/// §9's "variant behaviour across filesystem kinds" note) with a small
/// capability-bearing sum type.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum CandidateDetail {
    #[default]
    None,
    Fat {
        fat_bits: u8,
        cluster_count: u32,
    },
    Amiga {
        checksum_valid: bool,
        international: bool,
        dir_cache: bool,
    },
    Cpm {
        dpb: crate::bios::dpb::CpmDpb,
        boot_track_offset: u32,
    },
}

impl FormatCandidate {
    pub fn new(
        filesystem_kind: impl Into<String>,
        confidence: u8,
        description: impl Into<String>,
        machine_hint: impl Into<String>,
    ) -> Self {
        Self {
            filesystem_kind: filesystem_kind.into(),
            confidence: confidence.min(100),
            description: description.into(),
            machine_hint: machine_hint.into(),
            detail: CandidateDetail::None,
        }
    }

    pub fn with_detail(mut self, detail: CandidateDetail) -> Self {
        self.detail = detail;
        self
    }
}

/// An optional parsed boot descriptor: exactly one of the variants named
/// in §3's `DetectionResult`.
#[derive(Clone, Debug, PartialEq)]
pub enum BootDescriptor {
    Fat(crate::bios::bpb::FatBpb),
    Amiga(crate::bios::bpb::AmigaBootInfo),
}

/// Output of the detection engine (§4.1). Candidates are kept sorted by
/// descending confidence, capacity 8, ties broken by insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    pub geometry: DiskGeometry,
    pub boot_descriptor: Option<BootDescriptor>,
    candidates: Vec<FormatCandidate>,
}

/// Candidate list capacity named in §4.1.
pub const MAX_CANDIDATES: usize = 8;

impl DetectionResult {
    pub fn new(geometry: DiskGeometry) -> Self {
        Self {
            geometry,
            boot_descriptor: None,
            candidates: Vec::new(),
        }
    }

    /// Insert a candidate, keeping the list sorted strictly descending by
    /// confidence (stable on ties) and capped at [`MAX_CANDIDATES`]. When
    /// full, the weakest candidate is displaced only if the newcomer is
    /// strictly stronger.
    pub fn push_candidate(&mut self, candidate: FormatCandidate) {
        if self.candidates.len() >= MAX_CANDIDATES {
            let weakest = self
                .candidates
                .last()
                .map(|c| c.confidence)
                .unwrap_or(0);
            if candidate.confidence <= weakest {
                return;
            }
            self.candidates.pop();
        }
        let pos = self
            .candidates
            .iter()
            .position(|c| c.confidence < candidate.confidence)
            .unwrap_or(self.candidates.len());
        self.candidates.insert(pos, candidate);
    }

    pub fn candidates(&self) -> &[FormatCandidate] {
        &self.candidates
    }

    /// The top candidate's fields, duplicated for fast access (§3
    /// `best_*`), or `None` when the candidate list is empty.
    pub fn best(&self) -> Option<&FormatCandidate> {
        self.candidates.first()
    }

    pub fn best_fs(&self) -> Option<&str> {
        self.best().map(|c| c.filesystem_kind.as_str())
    }

    pub fn best_confidence(&self) -> Option<u8> {
        self.best().map(|c| c.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_derived_fields() {
        let g = DiskGeometry::new(512, 18, 2, 80, 1);
        assert_eq!(g.total_sectors(), 80 * 2 * 18);
        assert_eq!(g.disk_size(), 80 * 2 * 18 * 512);
    }

    #[test]
    #[should_panic]
    fn geometry_rejects_non_power_of_two_sector_size() {
        DiskGeometry::new(500, 18, 2, 80, 1);
    }

    #[test]
    fn candidates_stay_sorted_descending() {
        let g = DiskGeometry::new(512, 18, 2, 80, 1);
        let mut r = DetectionResult::new(g);
        r.push_candidate(FormatCandidate::new("a", 50, "a", "x"));
        r.push_candidate(FormatCandidate::new("b", 90, "b", "x"));
        r.push_candidate(FormatCandidate::new("c", 70, "c", "x"));
        let confidences: Vec<u8> = r.candidates().iter().map(|c| c.confidence).collect();
        assert_eq!(confidences, vec![90, 70, 50]);
        assert_eq!(r.best_fs(), Some("b"));
    }

    #[test]
    fn candidate_list_caps_at_eight_and_displaces_weakest() {
        let g = DiskGeometry::new(512, 18, 2, 80, 1);
        let mut r = DetectionResult::new(g);
        for i in 0..8 {
            r.push_candidate(FormatCandidate::new(format!("c{i}"), 10 + i as u8, "d", "x"));
        }
        assert_eq!(r.candidates().len(), 8);
        // weaker than the current weakest (10) must not displace anything
        r.push_candidate(FormatCandidate::new("weak", 5, "d", "x"));
        assert_eq!(r.candidates().len(), 8);
        assert!(r.candidates().iter().all(|c| c.filesystem_kind != "weak"));
        // stronger than the weakest must displace it
        r.push_candidate(FormatCandidate::new("strong", 99, "d", "x"));
        assert_eq!(r.candidates().len(), 8);
        assert_eq!(r.best_fs(), Some("strong"));
    }

    #[test]
    fn empty_result_has_no_best() {
        let g = DiskGeometry::new(512, 18, 2, 80, 1);
        let r = DetectionResult::new(g);
        assert!(r.best().is_none());
        assert!(r.best_fs().is_none());
    }
}
