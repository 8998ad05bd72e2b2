pub(crate) mod db_restore;
pub(crate) mod files;
pub(crate) mod verification;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::errors::BackupError;
use crate::model::{ArtifactKind, BackupRecord, RunStatus, VerificationStatus};
use crate::storage::{StorageLocation, StorageService};

/// Fails unless `path` is a non-empty file. Runs before any restore work.
pub(crate) fn check_artifact(path: &Path) -> Result<u64> {
    let metadata = match fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => return Err(BackupError::MissingArtifact(path.to_path_buf()).into()),
    };
    if metadata.len() == 0 {
        return Err(BackupError::EmptyArtifact(path.to_path_buf()).into());
    }
    Ok(metadata.len())
}

fn manifest_dir(manifest_path: &Path) -> PathBuf {
    manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf()
}

/// Brings the artifact back from storage when the local copy is gone.
async fn ensure_local_artifact(storage: &StorageService, record: &BackupRecord) -> Result<()> {
    let artifact = record.artifact()?;
    if artifact.exists() {
        return Ok(());
    }
    let Some(uri) = record.storage_location.as_deref() else {
        return Ok(());
    };
    let location: StorageLocation = uri.parse()?;
    println!("📥 Local artifact missing, fetching {}", location);
    storage
        .fetch(&location, artifact)
        .await
        .with_context(|| format!("Failed to fetch {} from storage", location))?;
    Ok(())
}

/// Restores the backup described by a manifest and writes the updated
/// record (restored count) back next to it.
pub async fn run_restore_flow(
    app_config: &AppConfig,
    manifest_path: &Path,
    target_dir: Option<&Path>,
) -> Result<BackupRecord> {
    let mut record = BackupRecord::load_manifest(manifest_path)?;
    if !matches!(record.status, RunStatus::Success | RunStatus::Partial) {
        return Err(BackupError::RunNotRestorable {
            backup: record.backup_name.clone(),
            status: record.status,
        }
        .into());
    }
    if !record.restorable {
        anyhow::bail!(
            "Backup {} is marked as not restorable (verification: {:?})",
            record.backup_name,
            record.verification_status
        );
    }

    let storage = StorageService::new(app_config.storage.clone());
    ensure_local_artifact(&storage, &record).await?;

    match record.kind {
        ArtifactKind::Database => {
            let settings = app_config
                .database
                .as_ref()
                .ok_or(BackupError::NotConfigured("Database"))?;
            db_restore::restore_database(settings, &mut record).await?;
        }
        ArtifactKind::Files => {
            let default_target;
            let target = match target_dir {
                Some(dir) => dir,
                None => {
                    default_target = app_config.work_directory.join("restore").join(&record.backup_name);
                    default_target.as_path()
                }
            };
            let entries = files::restore_files(&mut record, target).await?;
            println!("📂 Restored {} files into {}", entries, target.display());
        }
    }

    record.save_manifest(&manifest_dir(manifest_path))?;
    Ok(record)
}

/// Verifies the artifact of a manifest and persists the result.
pub fn run_verify_flow(manifest_path: &Path) -> Result<VerificationStatus> {
    let mut record = BackupRecord::load_manifest(manifest_path)?;
    let status = verification::verify_backup(&mut record);
    record.save_manifest(&manifest_dir(manifest_path))?;
    Ok(status)
}
