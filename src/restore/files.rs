// mailbackup/src/restore/files.rs
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::check_artifact;
use crate::backup::archive::extract_zip_archive;
use crate::model::BackupRecord;

/// Unpacks the record's zip into `target_dir` and counts the restore.
/// Returns the number of archive entries.
pub async fn restore_files(record: &mut BackupRecord, target_dir: &Path) -> Result<usize> {
    let artifact = record.artifact()?.to_path_buf();
    check_artifact(&artifact)?;

    tracing::info!(
        archive = %artifact.display(),
        target = %target_dir.display(),
        "Restoring files"
    );
    let archive: PathBuf = artifact.clone();
    let target = target_dir.to_path_buf();
    let entries = tokio::task::spawn_blocking(move || extract_zip_archive(&archive, &target))
        .await
        .context("Extraction worker failed")??;

    record.increment_restored_count();
    tracing::info!(entries, restored_count = record.restored_count, "File restore completed");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::files::FileBackupProducer;
    use crate::config::SourcePaths;
    use crate::errors::BackupError;
    use crate::model::{ArtifactKind, BackupMode, BackupScope, BackupTask, BackupType, StorageType};

    #[tokio::test]
    async fn test_archived_folder_restores_to_target() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let source = root.path().join("mailboxes");
        std::fs::create_dir_all(source.join("alice"))?;
        std::fs::write(source.join("alice").join("1.eml"), b"first")?;
        std::fs::write(source.join("index.db"), b"idx")?;

        let mut task = BackupTask::new("f", BackupType::FilesOnly, BackupScope::Folder, StorageType::Local, "/b");
        task.source_path = Some(source);
        let mut record = BackupRecord::new(&task, "f_run", ArtifactKind::Files, BackupMode::Full, &root.path().join("work"));
        FileBackupProducer::new(SourcePaths::default()).execute(&task, &mut record)?;

        let target = root.path().join("restored");
        let entries = restore_files(&mut record, &target).await?;

        assert_eq!(entries, 2);
        assert_eq!(std::fs::read(target.join("alice").join("1.eml"))?, b"first");
        assert_eq!(std::fs::read(target.join("index.db"))?, b"idx");
        assert_eq!(record.restored_count, 1);

        restore_files(&mut record, &target).await?;
        assert_eq!(record.restored_count, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_archive_file_fails_fast() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let artifact = dir.path().join("files_full_1.zip");
        std::fs::write(&artifact, b"")?;
        let task = BackupTask::new("f", BackupType::FilesOnly, BackupScope::User, StorageType::Local, "/b");
        let mut record = BackupRecord::new(&task, "n", ArtifactKind::Files, BackupMode::Full, dir.path());
        record.backup_path = Some(artifact);

        let err = restore_files(&mut record, &dir.path().join("out")).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BackupError>(), Some(BackupError::EmptyArtifact(_))));
        assert!(!dir.path().join("out").exists());
        Ok(())
    }
}
