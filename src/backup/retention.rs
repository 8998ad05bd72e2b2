// mailbackup/src/backup/retention.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::{BackupRecord, BackupTask};
use crate::storage::StorageService;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupSummary {
    pub examined: usize,
    pub removed: usize,
    pub failed: usize,
}

/// A record expires `retention_days` after it finished. Zero keeps
/// everything.
pub fn is_expired(record: &BackupRecord, retention_days: u32, now: DateTime<Utc>) -> bool {
    if retention_days == 0 {
        return false;
    }
    let reference = record.finished_at.unwrap_or(record.started_at);
    now - reference > Duration::days(i64::from(retention_days))
}

/// Manifests in `dir` that belong to `task_name`. Unreadable manifests are
/// logged and left alone.
pub fn load_task_manifests(dir: &Path, task_name: &str) -> Result<Vec<(PathBuf, BackupRecord)>> {
    let mut found = Vec::new();
    if !dir.is_dir() {
        return Ok(found);
    }
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read manifest directory {}", dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read entry in {}", dir.display()))?
            .path();
        let is_manifest = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(".record.json"));
        if !is_manifest {
            continue;
        }
        match BackupRecord::load_manifest(&path) {
            Ok(record) if record.task_name == task_name => found.push((path, record)),
            Ok(_) => {}
            Err(e) => tracing::warn!(manifest = %path.display(), error = %format!("{:#}", e), "Skipping unreadable manifest"),
        }
    }
    found.sort_by_key(|(_, record)| record.started_at);
    Ok(found)
}

/// Removes every expired backup of `task`: the local artifact, the stored
/// copy and finally the manifest. A failure leaves that manifest in place
/// so the next cleanup retries it.
pub async fn cleanup_expired(
    storage: &StorageService,
    task: &BackupTask,
    manifest_dir: &Path,
    now: DateTime<Utc>,
) -> Result<CleanupSummary> {
    let mut summary = CleanupSummary::default();

    for (manifest, record) in load_task_manifests(manifest_dir, &task.name)? {
        summary.examined += 1;
        if !is_expired(&record, task.retention_days, now) {
            continue;
        }

        let result = remove_backup(storage, &record, &manifest).await;
        match result {
            Ok(()) => {
                tracing::info!(backup = %record.backup_name, kind = record.kind.as_str(), "Removed expired backup");
                summary.removed += 1;
            }
            Err(e) => {
                tracing::error!(backup = %record.backup_name, error = %format!("{:#}", e), "Failed to remove expired backup");
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}

async fn remove_backup(storage: &StorageService, record: &BackupRecord, manifest: &Path) -> Result<()> {
    if let Some(path) = &record.backup_path {
        // the stored copy may be this very file for LOCAL tasks
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove artifact {}", path.display()))?;
        }
    }
    storage.delete(record).await?;
    fs::remove_file(manifest)
        .with_context(|| format!("Failed to remove manifest {}", manifest.display()))?;
    remove_empty_dir(&record.work_dir)
}

// The run directory is shared by the run's artifacts; it goes with the last one.
fn remove_empty_dir(dir: &Path) -> Result<()> {
    let is_empty = match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => return Ok(()),
    };
    if is_empty {
        fs::remove_dir(dir)
            .with_context(|| format!("Failed to remove empty run directory {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageSettings;
    use crate::model::{ArtifactKind, BackupMode, BackupScope, BackupType, RunStatus, StorageType};

    fn task(storage_path: &Path) -> BackupTask {
        let mut task = BackupTask::new(
            "nightly",
            BackupType::Full,
            BackupScope::System,
            StorageType::Local,
            &storage_path.to_string_lossy(),
        );
        task.retention_days = 7;
        task
    }

    fn finished_record(task: &BackupTask, name: &str, age_days: i64, work: &Path) -> BackupRecord {
        let mut record = BackupRecord::new(task, name, ArtifactKind::Files, BackupMode::Full, work);
        record.complete(RunStatus::Success, None);
        record.finished_at = Some(Utc::now() - Duration::days(age_days));
        record
    }

    #[test]
    fn test_expiry_uses_finish_time_and_zero_keeps_all() {
        let t = task(Path::new("/b"));
        let old = finished_record(&t, "old", 8, Path::new("/w"));
        let fresh = finished_record(&t, "fresh", 6, Path::new("/w"));
        let now = Utc::now();
        assert!(is_expired(&old, 7, now));
        assert!(!is_expired(&fresh, 7, now));
        assert!(!is_expired(&old, 0, now));
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired_backups_of_the_task() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let work = dir.path().join("work");
        let store = dir.path().join("store");
        fs::create_dir_all(&work)?;
        fs::create_dir_all(&store)?;
        let t = task(&store);

        let old_run_dir = work.join("nightly_full_old");
        fs::create_dir_all(&old_run_dir)?;
        let mut old = finished_record(&t, "nightly_full_old", 30, &old_run_dir);
        let old_artifact = old_run_dir.join("files_full_old.zip");
        let old_stored = store.join("files_full_old.zip");
        fs::write(&old_artifact, b"old")?;
        fs::write(&old_stored, b"old")?;
        old.backup_path = Some(old_artifact.clone());
        old.storage_location = Some(old_stored.display().to_string());
        let old_manifest = old.save_manifest(&work)?;

        let fresh = finished_record(&t, "nightly_full_fresh", 1, &work);
        let fresh_manifest = fresh.save_manifest(&work)?;

        let other_task = BackupTask::new("weekly", BackupType::Full, BackupScope::System, StorageType::Local, "/b");
        let foreign = finished_record(&other_task, "weekly_full_old", 30, &work);
        let foreign_manifest = foreign.save_manifest(&work)?;

        let storage = StorageService::new(StorageSettings::default());
        let summary = cleanup_expired(&storage, &t, &work, Utc::now()).await?;

        assert_eq!(summary, CleanupSummary { examined: 2, removed: 1, failed: 0 });
        assert!(!old_artifact.exists());
        assert!(!old_stored.exists());
        assert!(!old_manifest.exists());
        assert!(!old_run_dir.exists());
        assert!(work.is_dir());
        assert!(fresh_manifest.exists());
        assert!(foreign_manifest.exists());
        Ok(())
    }
}
