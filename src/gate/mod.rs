//! # Write Safety Gate (§4.6)
//!
//! The choke-point every destructive operation — disk-image write-back,
//! capture-to-image, container export — is expected to pass through.
//! Three independent checks run in order (format, drive, snapshot); an
//! overridable failure still lets a verified snapshot land before the
//! caller is allowed to proceed.

use std::fs;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

pub const CAP_READ: u8 = 0x1;
pub const CAP_WRITE: u8 = 0x2;
pub const CAP_PHYSICAL: u8 = 0x4;
pub const CAP_LOGICAL: u8 = 0x8;
pub const CAP_PROTECTED: u8 = 0x10;

pub const CHECK_FORMAT: u32 = 0x1;
pub const CHECK_DRIVE: u32 = 0x2;
pub const CHECK_SNAPSHOT: u32 = 0x4;

const MIN_CONFIDENCE: u8 = 50;

/// Status of a gate decision (§7 "Gate").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateStatus {
    Ok,
    FormatReadOnly,
    DriveUnsafe,
    SnapshotFailed,
    VerifyFailed,
    NeedsOverride,
    PrecheckFailed,
}

/// Result of probing the target's format family (§4.6 check 1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatProbe {
    pub kind: String,
    pub capabilities: u8,
    pub confidence: u8,
}

impl FormatProbe {
    fn has(&self, cap: u8) -> bool {
        self.capabilities & cap != 0
    }
}

/// Caller-supplied drive diagnostics (§4.6 check 2). Absent entirely
/// when the target isn't live hardware.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriveDiag {
    pub write_protect: bool,
    pub write_unsafe: bool,
    pub no_disk: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotMetadata {
    pub path: PathBuf,
    pub sha256: [u8; 32],
    pub size: u64,
}

/// `{status, checks_passed_mask, checks_failed_mask, reason,
/// override_required, snapshot_metadata, drive_diag_snapshot,
/// format_probe}` plus an audit trail of every decision the gate made.
#[derive(Clone, Debug)]
pub struct Decision {
    pub status: GateStatus,
    pub checks_passed_mask: u32,
    pub checks_failed_mask: u32,
    pub reason: String,
    pub override_required: bool,
    pub snapshot_metadata: Option<SnapshotMetadata>,
    pub drive_diag_snapshot: Option<DriveDiag>,
    pub format_probe: FormatProbe,
    pub audit_trail: Vec<String>,
}

impl Decision {
    pub fn allowed(&self) -> bool {
        self.status == GateStatus::Ok
    }
}

/// Format capability lookup by size/magic (§4.1 Stage 1/2 signatures).
/// This mirrors only the capability-relevant subset of that table; full
/// format identification belongs to [`crate::detect`].
pub fn probe_format(image: &[u8]) -> FormatProbe {
    let len = image.len();
    if len == 232_960 {
        return FormatProbe { kind: "NIB".into(), capabilities: CAP_READ | CAP_PHYSICAL | CAP_PROTECTED, confidence: 90 };
    }
    if len == 901_120 && image.len() >= 4 && &image[0..3] == b"DOS" {
        return FormatProbe { kind: "Amiga-DD".into(), capabilities: CAP_READ | CAP_WRITE | CAP_LOGICAL, confidence: 90 };
    }
    if len == 1_474_560 {
        return FormatProbe { kind: "PC-1.44M".into(), capabilities: CAP_READ | CAP_WRITE | CAP_LOGICAL, confidence: 90 };
    }
    if len == 368_640 || len == 737_280 {
        return FormatProbe { kind: "PC-360K-720K".into(), capabilities: CAP_READ | CAP_WRITE | CAP_LOGICAL, confidence: 85 };
    }
    FormatProbe { kind: "unknown".into(), capabilities: CAP_READ, confidence: 10 }
}

/// `UFT_SESSION_DIR`, falling back to a per-user application-data
/// directory (§6 "Environment variables").
pub fn default_session_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("UFT_SESSION_DIR") {
        return PathBuf::from(dir);
    }
    if cfg!(windows) {
        let base = std::env::var("LOCALAPPDATA").unwrap_or_else(|_| ".".into());
        PathBuf::from(base).join("UFT").join("sessions")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".local/share/uft/sessions")
    }
}

pub struct WriteGate {
    session_dir: PathBuf,
}

impl WriteGate {
    pub fn new(session_dir: PathBuf) -> Self {
        Self { session_dir }
    }

    pub fn with_default_session_dir() -> Self {
        Self::new(default_session_dir())
    }

    /// Run the Format → Drive → Snapshot pipeline (§4.6 "Ordering").
    /// `override_reason`, when given, lifts every overridable failure
    /// and still demands a verified snapshot before allowing the write.
    pub fn evaluate(
        &self,
        image: &[u8],
        drive_diag: Option<DriveDiag>,
        prefix: &str,
        override_reason: Option<&str>,
    ) -> Decision {
        let mut audit = Vec::new();
        let mut passed = 0u32;
        let mut failed = 0u32;
        let mut hard_block = false;
        let mut format_overridable = false;
        let mut drive_overridable = false;
        let mut reason = String::new();

        let format_probe = probe_format(image);
        if !format_probe.has(CAP_WRITE) || format_probe.confidence < MIN_CONFIDENCE {
            failed |= CHECK_FORMAT;
            format_overridable = true;
            reason = format!("format '{}' lacks write capability or confidence too low", format_probe.kind);
            audit.push(reason.clone());
        } else {
            passed |= CHECK_FORMAT;
            audit.push(format!("format '{}' passed", format_probe.kind));
        }

        if let Some(diag) = drive_diag {
            if diag.no_disk || diag.write_protect {
                failed |= CHECK_DRIVE;
                hard_block = true;
                let note = if diag.no_disk { "no disk present" } else { "write-protect tab set" };
                audit.push(format!("drive check hard-blocked: {note}"));
                if reason.is_empty() {
                    reason = note.into();
                }
            } else if diag.write_unsafe {
                failed |= CHECK_DRIVE;
                drive_overridable = true;
                audit.push("drive check overridable: unsafe condition reported".into());
                if reason.is_empty() {
                    reason = "drive reports an unsafe condition".into();
                }
            } else {
                passed |= CHECK_DRIVE;
                audit.push("drive check passed".into());
            }
        }

        let overridable = format_overridable || drive_overridable;

        if hard_block {
            log::warn!("gate hard-blocked: {reason}");
            audit.push("hard block present, no snapshot attempted".into());
            return Decision {
                status: GateStatus::PrecheckFailed,
                checks_passed_mask: passed,
                checks_failed_mask: failed,
                reason,
                override_required: false,
                snapshot_metadata: None,
                drive_diag_snapshot: drive_diag,
                format_probe,
                audit_trail: audit,
            };
        }

        if overridable && override_reason.is_none() {
            audit.push("overridable failure present, no override given, snapshot skipped".into());
            let status = match (format_overridable, drive_overridable) {
                (true, true) => GateStatus::NeedsOverride,
                (true, false) => GateStatus::FormatReadOnly,
                (false, true) => GateStatus::DriveUnsafe,
                (false, false) => unreachable!("overridable implies one of the two flags is set"),
            };
            return Decision {
                status,
                checks_passed_mask: passed,
                checks_failed_mask: failed,
                reason,
                override_required: true,
                snapshot_metadata: None,
                drive_diag_snapshot: drive_diag,
                format_probe,
                audit_trail: audit,
            };
        }

        if let Some(note) = override_reason {
            audit.push(format!("override applied: {note}"));
            reason = format!("{reason} (overridden: {note})").trim().to_string();
        }

        match self.write_snapshot(image, prefix) {
            Ok(metadata) => {
                passed |= CHECK_SNAPSHOT;
                log::info!("snapshot {} sha256={}", metadata.path.display(), hex::encode(metadata.sha256));
                audit.push(format!("snapshot written and verified at {}", metadata.path.display()));
                Decision {
                    status: GateStatus::Ok,
                    checks_passed_mask: passed,
                    checks_failed_mask: failed,
                    reason,
                    override_required: false,
                    snapshot_metadata: Some(metadata),
                    drive_diag_snapshot: drive_diag,
                    format_probe,
                    audit_trail: audit,
                }
            }
            Err(status) => {
                failed |= CHECK_SNAPSHOT;
                log::error!("snapshot step failed: {status:?}");
                audit.push(format!("snapshot step failed: {status:?}"));
                Decision {
                    status,
                    checks_passed_mask: passed,
                    checks_failed_mask: failed,
                    reason,
                    override_required: false,
                    snapshot_metadata: None,
                    drive_diag_snapshot: drive_diag,
                    format_probe,
                    audit_trail: audit,
                }
            }
        }
    }

    fn write_snapshot(&self, image: &[u8], prefix: &str) -> Result<SnapshotMetadata, GateStatus> {
        fs::create_dir_all(&self.session_dir).map_err(|_| GateStatus::SnapshotFailed)?;
        let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.fZ");
        let path: PathBuf = self.session_dir.join(format!("{prefix}.{timestamp}.bin"));
        fs::write(&path, image).map_err(|_| GateStatus::SnapshotFailed)?;

        let mut hasher = Sha256::new();
        hasher.update(image);
        let expected: [u8; 32] = hasher.finalize().into();

        let reread = fs::read(&path).map_err(|_| GateStatus::VerifyFailed)?;
        let mut hasher = Sha256::new();
        hasher.update(&reread);
        let actual: [u8; 32] = hasher.finalize().into();
        if actual != expected {
            return Err(GateStatus::VerifyFailed);
        }

        Ok(SnapshotMetadata { path, sha256: expected, size: image.len() as u64 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> (WriteGate, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (WriteGate::new(dir.path().to_path_buf()), dir)
    }

    #[test]
    fn s7_nib_write_is_denied_without_override() {
        let (gate, _dir) = gate();
        let image = vec![0u8; 232_960];
        let decision = gate.evaluate(&image, None, "nib-session", None);
        assert_eq!(decision.status, GateStatus::FormatReadOnly);
        assert!(decision.override_required);
        assert!(decision.snapshot_metadata.is_none());
    }

    #[test]
    fn s7_nib_write_allowed_and_snapshotted_with_override() {
        let (gate, _dir) = gate();
        let image = vec![0u8; 232_960];
        let decision = gate.evaluate(&image, None, "nib-session", Some("operator confirmed re-dump"));
        assert_eq!(decision.status, GateStatus::Ok);
        assert!(decision.snapshot_metadata.is_some());
        let meta = decision.snapshot_metadata.unwrap();
        assert!(meta.path.exists());
    }

    #[test]
    fn write_protect_is_a_hard_block_even_with_override() {
        let (gate, _dir) = gate();
        let image = vec![0u8; 901_120];
        let diag = DriveDiag { write_protect: true, ..Default::default() };
        let decision = gate.evaluate(&image, Some(diag), "amiga-session", Some("try anyway"));
        assert_eq!(decision.status, GateStatus::PrecheckFailed);
        assert!(!decision.override_required);
        assert!(decision.snapshot_metadata.is_none());
    }

    #[test]
    fn clean_write_capable_format_needs_no_override() {
        let (gate, _dir) = gate();
        let mut image = vec![0u8; 901_120];
        image[0..3].copy_from_slice(b"DOS");
        let decision = gate.evaluate(&image, None, "amiga-session", None);
        assert_eq!(decision.status, GateStatus::Ok);
        assert!(decision.snapshot_metadata.is_some());
    }
}
