//! Stage 2 — boot-sector analysis (§4.1).

use crate::bios::bpb::{AmigaBootInfo, FatBpb};
use crate::geometry::{BootDescriptor, CandidateDetail, DetectionResult, DiskGeometry, FormatCandidate};
use crate::primitives::checksum;

/// Analyze logical sector 0 (and sector 1, for Amiga's 1024-byte
/// bootblock). Returns `true` when the match is exclusive (Amiga/PFS),
/// meaning Stage 3 must not run.
pub fn analyze(image: &[u8], geometry: &DiskGeometry, result: &mut DetectionResult) -> bool {
    if image.len() < 512 {
        return false;
    }
    let bootblock_len = 1024.min(image.len());
    let disk_type = &image[0..4.min(image.len())];

    if disk_type.len() >= 3 && &disk_type[0..3] == b"DOS" {
        if let Some(info) = AmigaBootInfo::parse(&image[0..bootblock_len]) {
            let kind = match (info.is_ffs, info.is_international, info.is_dircache) {
                (true, _, true) => "Amiga FFS-DirCache",
                (true, true, false) => "Amiga FFS-International",
                (true, false, false) => "Amiga FFS",
                (false, true, _) => "Amiga OFS-International",
                (false, false, _) => "Amiga OFS",
            };
            let confidence = if info.checksum_valid { 98 } else { 90 };
            if !info.checksum_valid {
                log::debug!("Amiga bootblock checksum did not validate, confidence capped at {confidence}");
            }
            result.push_candidate(
                FormatCandidate::new(kind, confidence, format!("Amiga bootblock, {kind}"), "Amiga")
                    .with_detail(CandidateDetail::Amiga {
                        checksum_valid: info.checksum_valid,
                        international: info.is_international,
                        dir_cache: info.is_dircache,
                    }),
            );
            result.boot_descriptor = Some(BootDescriptor::Amiga(info));
            return true;
        }
    }
    if disk_type == b"PFS\x01" {
        result.push_candidate(FormatCandidate::new(
            "Amiga PFS",
            95,
            "Professional File System bootblock",
            "Amiga",
        ));
        return true;
    }

    let Some(bpb) = FatBpb::parse(image) else {
        return false;
    };

    if bpb.is_valid() {
        analyze_fat_family(image, &bpb, result);
        result.boot_descriptor = Some(BootDescriptor::Fat(bpb));
        false
    } else {
        analyze_provisional(geometry, result);
        false
    }
}

fn analyze_fat_family(image: &[u8], bpb: &FatBpb, result: &mut DetectionResult) {
    let oem = String::from_utf8_lossy(&bpb.oem_name).to_uppercase();

    // Atari-ST: 16-bit BE wordwise sum over the 512-byte boot sector.
    let word_sum = checksum::atari_st_word_sum(&image[0..512]);
    if word_sum == 0x1234 {
        let mut conf: u8 = 95;
        if bpb.jump_byte0 == 0x60 {
            conf = conf.saturating_add(5);
        }
        result.push_candidate(FormatCandidate::new(
            "FAT12-AtariST",
            conf.min(100),
            "FAT12 on an Atari-ST formatted disk (checksum match)",
            "Atari ST",
        ));
    } else if oem.contains("ATARI")
        || oem.contains("TOS")
        || oem.contains("GEM")
        || (oem.trim().is_empty() && bpb.jump_byte0 != 0xEB && bpb.jump_byte0 != 0xE9)
    {
        result.push_candidate(FormatCandidate::new(
            "FAT12-AtariST",
            80,
            "FAT12 boot sector with Atari-ST OEM hint",
            "Atari ST",
        ));
    }

    if oem.contains("MSX") || oem.contains("NEXTOR") || bpb.jump_byte0 == 0xC3 || has_code_byte(image, &[0xC3, 0xC9]) {
        result.push_candidate(FormatCandidate::new(
            "FAT12-MSX",
            75,
            "FAT12 boot sector with MSX-DOS hints",
            "MSX",
        ));
    }

    let mut ms_conf: u8 = 70;
    if bpb.jump_byte0 == 0xEB || bpb.jump_byte0 == 0xE9 {
        ms_conf += 10;
    }
    if bpb.has_boot_signature {
        ms_conf += 10;
    }
    if ["MSDOS", "MSWIN", "IBM", "DRDOS", "FREEDOS"].iter().any(|s| oem.contains(s)) {
        ms_conf += 5;
    }
    if bpb.fs_type.as_deref().map(|s| s.contains("FAT12")).unwrap_or(false) {
        ms_conf += 5;
    }
    let kind = if bpb.is_fat12() { "FAT12-MSDOS" } else { "FAT16-MSDOS" };
    result.push_candidate(
        FormatCandidate::new(kind, ms_conf.min(100), "FAT boot sector with MS-DOS family signature", "IBM PC")
            .with_detail(CandidateDetail::Fat {
                fat_bits: if bpb.is_fat12() { 12 } else { 16 },
                cluster_count: bpb.cluster_count(),
            }),
    );
}

fn has_code_byte(image: &[u8], targets: &[u8]) -> bool {
    image[0..62.min(image.len())].iter().any(|b| targets.contains(b))
}

fn analyze_provisional(geometry: &DiskGeometry, result: &mut DetectionResult) {
    if geometry.cylinders() == 80 && geometry.heads() == 2 && geometry.sectors_per_track() == 10 && geometry.sector_size() == 512 {
        result.push_candidate(FormatCandidate::new(
            "CBM-1581",
            50,
            "geometry matches the Commodore 1581 3.5-inch format",
            "Commodore 1581",
        ));
    }
    let fingerprint_conf = match (geometry.sector_size(), geometry.sectors_per_track(), geometry.heads()) {
        (512, spt, 1) if spt <= 10 => 35,
        (512, _, 1) => 28,
        (512, _, 2) => 25,
        _ => 20,
    };
    result.push_candidate(FormatCandidate::new(
        "CPM-provisional",
        fingerprint_conf,
        "no valid FAT BPB; provisional CP/M candidate from geometry alone",
        "unknown CP/M machine",
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::geometry_table;

    fn pc144_image() -> Vec<u8> {
        let mut b = vec![0u8; 1_474_560];
        b[0] = 0xEB;
        b[1] = 0x3C;
        b[2] = 0x90;
        crate::primitives::endian::put_le16(&mut b, 11, 512);
        b[13] = 1;
        crate::primitives::endian::put_le16(&mut b, 14, 1);
        b[16] = 2;
        crate::primitives::endian::put_le16(&mut b, 17, 224);
        crate::primitives::endian::put_le16(&mut b, 19, 2880);
        b[21] = 0xF0;
        crate::primitives::endian::put_le16(&mut b, 22, 9);
        crate::primitives::endian::put_le16(&mut b, 24, 18);
        crate::primitives::endian::put_le16(&mut b, 26, 2);
        crate::primitives::endian::put_le16(&mut b, 510, 0xAA55);
        b
    }

    #[test]
    fn s1_pc_144_is_top_candidate() {
        let image = pc144_image();
        let geometry = geometry_table::resolve(image.len()).unwrap();
        let mut result = DetectionResult::new(geometry);
        let exclusive = analyze(&image, &geometry, &mut result);
        assert!(!exclusive);
        assert!(result.best_confidence().unwrap() >= 90);
        assert_eq!(result.best_fs(), Some("FAT12-MSDOS"));
    }

    #[test]
    fn s2_amiga_ffs_is_exclusive_and_high_confidence() {
        let mut image = vec![0u8; 901_120];
        image[0..4].copy_from_slice(b"DOS\x01");
        image[8..12].copy_from_slice(&880u32.to_be_bytes());
        image[12] = 1;
        let chk = checksum::amiga_checksum_compute(&image[0..1024]);
        image[4..8].copy_from_slice(&chk.to_be_bytes());
        let geometry = geometry_table::resolve(image.len()).unwrap();
        let mut result = DetectionResult::new(geometry);
        let exclusive = analyze(&image, &geometry, &mut result);
        assert!(exclusive);
        assert!(result.best_confidence().unwrap() >= 98);
        assert_eq!(result.best_fs(), Some("Amiga FFS"));
    }

    #[test]
    fn atari_and_msdos_both_appear_atari_wins() {
        let mut image = pc144_image();
        image.truncate(737_280);
        image[510] = 0x55;
        image[511] = 0xAA;
        crate::primitives::endian::put_le16(&mut image, 19, 1440);
        // Zero the checksum word pair, then pick a value that makes the word sum equal 0x1234.
        let boot = &mut image[0..512];
        let mut sum: u32 = 0;
        for chunk in boot.chunks(2) {
            sum = sum.wrapping_add(u16::from_be_bytes([chunk[0], chunk[1]]) as u32);
        }
        let current = (sum & 0xFFFF) as u16;
        let adjust = 0x1234u16.wrapping_sub(current);
        boot[500] = (adjust >> 8) as u8;
        boot[501] = (adjust & 0xFF) as u8;
        let geometry = geometry_table::resolve(image.len()).unwrap();
        let mut result = DetectionResult::new(geometry);
        analyze(&image, &geometry, &mut result);
        let kinds: Vec<&str> = result.candidates().iter().map(|c| c.filesystem_kind.as_str()).collect();
        assert!(kinds.contains(&"FAT12-AtariST"));
        assert!(kinds.contains(&"FAT12-MSDOS") || kinds.contains(&"FAT16-MSDOS"));
        assert_eq!(result.best_fs(), Some("FAT12-AtariST"));
    }
}
