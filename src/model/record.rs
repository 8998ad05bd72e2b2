// mailbackup/src/model/record.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::task::{BackupMode, BackupTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Database,
    Files,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Database => "database",
            ArtifactKind::Files => "files",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    NotVerified,
    Verified,
    VerificationFailed,
    Corrupted,
}

/// Result of producing one artifact for one run.
///
/// The producer that creates the artifact owns the record while it runs;
/// afterwards the orchestrator finalises it and hands it to storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: Uuid,
    pub task_name: String,
    pub backup_name: String,
    pub kind: ArtifactKind,
    pub mode: BackupMode,
    /// Directory the producers write new artifacts into.
    pub work_dir: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub backup_size: u64,
    pub compressed_size: Option<u64>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub files_processed: u32,
    pub files_skipped: u32,
    pub files_failed: u32,
    pub database_tables: u32,
    pub database_records: u64,
    pub checksum: Option<String>,
    pub compression_ratio: Option<f64>,
    pub storage_location: Option<String>,
    pub error_message: Option<String>,
    pub restorable: bool,
    pub restored_count: u32,
    pub verification_status: VerificationStatus,
    pub last_verified_at: Option<DateTime<Utc>>,
}

impl BackupRecord {
    pub fn new(
        task: &BackupTask,
        backup_name: &str,
        kind: ArtifactKind,
        mode: BackupMode,
        work_dir: &Path,
    ) -> Self {
        BackupRecord {
            id: Uuid::new_v4(),
            task_name: task.name.clone(),
            backup_name: backup_name.to_string(),
            kind,
            mode,
            work_dir: work_dir.to_path_buf(),
            backup_path: None,
            backup_size: 0,
            compressed_size: None,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            duration_secs: None,
            files_processed: 0,
            files_skipped: 0,
            files_failed: 0,
            database_tables: 0,
            database_records: 0,
            checksum: None,
            compression_ratio: None,
            storage_location: None,
            error_message: None,
            restorable: true,
            restored_count: 0,
            verification_status: VerificationStatus::NotVerified,
            last_verified_at: None,
        }
    }

    /// Artifact path, or an error when the producer has not run yet.
    pub fn artifact(&self) -> Result<&Path> {
        self.backup_path
            .as_deref()
            .with_context(|| format!("Backup record {} has no artifact path", self.backup_name))
    }

    pub fn total_files(&self) -> u32 {
        self.files_processed + self.files_skipped + self.files_failed
    }

    pub fn complete(&mut self, status: RunStatus, error_message: Option<String>) {
        let finished_at = Utc::now();
        self.status = status;
        self.error_message = error_message;
        self.duration_secs = Some((finished_at - self.started_at).num_seconds());
        self.finished_at = Some(finished_at);
        if let Some(compressed) = self.compressed_size {
            if self.backup_size > 0 {
                self.compression_ratio = Some(compressed as f64 / self.backup_size as f64);
            }
        }
    }

    pub fn increment_restored_count(&mut self) {
        self.restored_count += 1;
    }

    pub fn set_verification_result(&mut self, status: VerificationStatus) {
        self.verification_status = status;
        self.last_verified_at = Some(Utc::now());
        if matches!(
            status,
            VerificationStatus::VerificationFailed | VerificationStatus::Corrupted
        ) {
            self.restorable = false;
        }
    }

    pub fn manifest_file_name(&self) -> String {
        format!("{}_{}.record.json", self.backup_name, self.kind.as_str())
    }

    /// Writes the record as pretty JSON into `dir` and returns the path.
    pub fn save_manifest(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create manifest directory {}", dir.display()))?;
        let path = dir.join(self.manifest_file_name());
        let json = serde_json::to_string_pretty(self)
            .with_context(|| format!("Failed to serialize backup record {}", self.backup_name))?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
        Ok(path)
    }

    pub fn load_manifest(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackupScope, BackupType, StorageType};

    fn record() -> BackupRecord {
        let task = BackupTask::new("nightly", BackupType::Full, BackupScope::System, StorageType::Local, "/b");
        BackupRecord::new(&task, "nightly_full_1", ArtifactKind::Database, BackupMode::Full, Path::new("/tmp"))
    }

    #[test]
    fn test_new_record_counters_start_at_zero() {
        let r = record();
        assert_eq!(r.total_files(), 0);
        assert_eq!(r.status, RunStatus::Running);
        assert!(r.restorable);
        assert!(r.artifact().is_err());
    }

    #[test]
    fn test_complete_computes_ratio() {
        let mut r = record();
        r.backup_size = 1000;
        r.compressed_size = Some(250);
        r.complete(RunStatus::Success, None);
        assert_eq!(r.compression_ratio, Some(0.25));
        assert!(r.finished_at.is_some());
        assert!(r.duration_secs.unwrap_or(-1) >= 0);
    }

    #[test]
    fn test_corrupted_verification_clears_restorable() {
        let mut r = record();
        r.set_verification_result(VerificationStatus::Verified);
        assert!(r.restorable);
        r.set_verification_result(VerificationStatus::Corrupted);
        assert!(!r.restorable);
        assert!(r.last_verified_at.is_some());
    }

    #[test]
    fn test_manifest_round_trip_keeps_restore_state() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut r = record();
        r.backup_path = Some(dir.path().join("database_full_x.sql"));
        r.increment_restored_count();

        let path = r.save_manifest(dir.path())?;
        assert!(path.ends_with("nightly_full_1_database.record.json"));

        let loaded = BackupRecord::load_manifest(&path)?;
        assert_eq!(loaded.id, r.id);
        assert_eq!(loaded.restored_count, 1);
        assert_eq!(loaded.mode, BackupMode::Full);
        Ok(())
    }
}
