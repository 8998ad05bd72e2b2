// mailbackup/src/restore/verification.rs
use std::fs;

use crate::model::{BackupRecord, VerificationStatus};
use crate::utils::checksum::sha256_file;

/// Re-reads the record's artifact and compares it with what the run
/// recorded.
///
/// The artifact must exist, have the recorded size (compressed size when
/// the dump was gzipped) and hash to the recorded checksum. A missing
/// artifact or a mismatch marks the backup CORRUPTED; an artifact that
/// cannot be read, or a record with no checksum, marks it
/// VERIFICATION_FAILED. Either clears `restorable`.
pub fn verify_backup(record: &mut BackupRecord) -> VerificationStatus {
    let status = check(record);
    record.set_verification_result(status);
    status
}

fn check(record: &BackupRecord) -> VerificationStatus {
    let Ok(artifact) = record.artifact() else {
        return VerificationStatus::VerificationFailed;
    };
    let Some(expected_checksum) = record.checksum.as_deref() else {
        tracing::warn!(backup = %record.backup_name, "No checksum recorded, cannot verify");
        return VerificationStatus::VerificationFailed;
    };

    let size = match fs::metadata(artifact) {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(artifact = %artifact.display(), "Artifact is gone");
            return VerificationStatus::Corrupted;
        }
        Err(e) => {
            tracing::warn!(artifact = %artifact.display(), error = %e, "Cannot read artifact for verification");
            return VerificationStatus::VerificationFailed;
        }
    };
    let expected_size = record.compressed_size.unwrap_or(record.backup_size);
    if size != expected_size {
        tracing::warn!(artifact = %artifact.display(), size, expected_size, "Artifact size differs from record");
        return VerificationStatus::Corrupted;
    }

    match sha256_file(artifact) {
        Ok(actual) if actual == expected_checksum => VerificationStatus::Verified,
        Ok(actual) => {
            tracing::warn!(artifact = %artifact.display(), %actual, expected = %expected_checksum, "Checksum mismatch");
            VerificationStatus::Corrupted
        }
        Err(e) => {
            tracing::warn!(artifact = %artifact.display(), error = %format!("{:#}", e), "Checksum could not be computed");
            VerificationStatus::VerificationFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtifactKind, BackupMode, BackupScope, BackupTask, BackupType, StorageType};
    use std::path::Path;

    fn recorded(artifact: &Path) -> anyhow::Result<BackupRecord> {
        let task = BackupTask::new("t", BackupType::Full, BackupScope::User, StorageType::Local, "/b");
        let mut record = BackupRecord::new(&task, "n", ArtifactKind::Files, BackupMode::Full, Path::new("/w"));
        record.backup_path = Some(artifact.to_path_buf());
        record.backup_size = fs::metadata(artifact)?.len();
        record.checksum = Some(sha256_file(artifact)?);
        Ok(record)
    }

    #[test]
    fn test_untouched_artifact_verifies() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let artifact = dir.path().join("a.zip");
        fs::write(&artifact, b"archive bytes")?;
        let mut record = recorded(&artifact)?;

        assert_eq!(verify_backup(&mut record), VerificationStatus::Verified);
        assert!(record.restorable);
        assert!(record.last_verified_at.is_some());
        Ok(())
    }

    #[test]
    fn test_same_size_tampering_is_corruption() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let artifact = dir.path().join("a.zip");
        fs::write(&artifact, b"archive bytes")?;
        let mut record = recorded(&artifact)?;
        fs::write(&artifact, b"archive bytez")?;

        assert_eq!(verify_backup(&mut record), VerificationStatus::Corrupted);
        assert!(!record.restorable);
        Ok(())
    }

    #[test]
    fn test_truncated_artifact_is_corruption() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let artifact = dir.path().join("a.zip");
        fs::write(&artifact, b"archive bytes")?;
        let mut record = recorded(&artifact)?;
        fs::write(&artifact, b"arch")?;

        assert_eq!(verify_backup(&mut record), VerificationStatus::Corrupted);
        Ok(())
    }

    #[test]
    fn test_missing_artifact_is_corruption() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let artifact = dir.path().join("a.zip");
        fs::write(&artifact, b"archive bytes")?;
        let mut record = recorded(&artifact)?;
        fs::remove_file(&artifact)?;

        assert_eq!(verify_backup(&mut record), VerificationStatus::Corrupted);
        assert!(!record.restorable);
        Ok(())
    }

    #[test]
    fn test_record_without_checksum_fails_verification() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let artifact = dir.path().join("a.zip");
        fs::write(&artifact, b"archive bytes")?;
        let mut record = recorded(&artifact)?;
        record.checksum = None;

        assert_eq!(verify_backup(&mut record), VerificationStatus::VerificationFailed);
        assert!(!record.restorable);
        Ok(())
    }
}
