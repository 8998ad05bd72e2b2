// mailbackup/src/backup/logic.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use super::archive::gzip_file;
use super::catalog::{Catalog, MySqlCatalog};
use super::db_dump::DatabaseBackupProducer;
use super::files::FileBackupProducer;
use crate::config::AppConfig;
use crate::errors::{BackupError, RunFailed};
use crate::model::{ArtifactKind, BackupMode, BackupRecord, BackupTask, BackupType, RunStatus};
use crate::storage::StorageService;
use crate::utils::checksum::sha256_file;
use crate::utils::format::{format_duration, format_size};

/// Mode and artifacts a run of `task` produces.
///
/// Incremental and differential runs without a reference time fall back
/// to a full run. An empty artifact list is an error.
pub fn plan_run(
    task: &BackupTask,
    reference: Option<DateTime<Utc>>,
) -> Result<(BackupMode, Vec<ArtifactKind>)> {
    let mode = match (task.backup_type, reference) {
        (BackupType::Incremental, Some(since)) => BackupMode::Incremental(since),
        (BackupType::Differential, Some(since)) => BackupMode::Differential(since),
        (BackupType::Incremental | BackupType::Differential, None) => {
            tracing::info!(task = %task.name, "No reference time given, running a full backup instead");
            BackupMode::Full
        }
        _ => BackupMode::Full,
    };

    let mut kinds = Vec::with_capacity(2);
    let wants_database = !matches!(task.backup_type, BackupType::FilesOnly);
    let wants_files = !matches!(task.backup_type, BackupType::DatabaseOnly);
    if wants_database && task.includes_database() {
        kinds.push(ArtifactKind::Database);
    }
    if wants_files && task.includes_files() {
        kinds.push(ArtifactKind::Files);
    }

    if kinds.is_empty() {
        return Err(BackupError::NothingToBackUp {
            task: task.name.clone(),
        }
        .into());
    }
    Ok((mode, kinds))
}

/// Reference time for a run of `task`, taken from its earlier records.
///
/// Incremental runs start from the latest run that finished SUCCESS or
/// PARTIAL; differential runs from the latest SUCCESS full run. The start
/// time is used so changes made while that run was walking are picked up
/// again. Other types have no reference.
pub fn reference_from_history(task: &BackupTask, history: &[BackupRecord]) -> Option<DateTime<Utc>> {
    let usable = |record: &&BackupRecord| match task.backup_type {
        BackupType::Incremental => matches!(record.status, RunStatus::Success | RunStatus::Partial),
        BackupType::Differential => record.status == RunStatus::Success && record.mode == BackupMode::Full,
        _ => false,
    };
    history
        .iter()
        .filter(|record| record.task_name == task.name)
        .filter(usable)
        .map(|record| record.started_at)
        .max()
}

fn final_status(record: &BackupRecord) -> RunStatus {
    if record.files_failed > 0 {
        RunStatus::Partial
    } else {
        RunStatus::Success
    }
}

/// Drives one run: produce each planned artifact, then compress, checksum
/// and deliver it. The first fatal error stops the run.
pub struct BackupOrchestrator<C> {
    database: Option<DatabaseBackupProducer<C>>,
    files: FileBackupProducer,
    storage: StorageService,
    work_directory: PathBuf,
}

impl BackupOrchestrator<MySqlCatalog> {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let database = match &config.database {
            Some(settings) => {
                let catalog = MySqlCatalog::connect_lazy(settings)?;
                Some(DatabaseBackupProducer::new(settings.clone(), catalog))
            }
            None => None,
        };
        Ok(BackupOrchestrator::new(
            database,
            FileBackupProducer::new(config.sources.clone()),
            StorageService::new(config.storage.clone()),
            config.work_directory.clone(),
        ))
    }
}

impl<C: Catalog> BackupOrchestrator<C> {
    pub fn new(
        database: Option<DatabaseBackupProducer<C>>,
        files: FileBackupProducer,
        storage: StorageService,
        work_directory: PathBuf,
    ) -> Self {
        BackupOrchestrator {
            database,
            files,
            storage,
            work_directory,
        }
    }

    pub async fn execute(
        &self,
        task: &BackupTask,
        reference: Option<DateTime<Utc>>,
    ) -> Result<Vec<BackupRecord>, RunFailed> {
        let (mode, kinds) = plan_run(task, reference).map_err(|source| RunFailed {
            task: task.name.clone(),
            records: Vec::new(),
            source,
        })?;

        let backup_name = task.backup_name(Utc::now());
        let work_dir = self.work_directory.join(&backup_name);
        tracing::info!(
            task = %task.name,
            backup = %backup_name,
            mode = mode.label(),
            artifacts = kinds.len(),
            "Starting backup run"
        );

        let mut records = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let record = BackupRecord::new(task, &backup_name, kind, mode, &work_dir);
            let (mut record, outcome) = self.produce(task, record).await;
            if let Err(source) = outcome {
                tracing::error!(
                    task = %task.name,
                    kind = kind.as_str(),
                    error = %format!("{:#}", source),
                    "Backup run failed"
                );
                record.complete(RunStatus::Failed, Some(format!("{:#}", source)));
                records.push(record);
                return Err(RunFailed {
                    task: task.name.clone(),
                    records,
                    source,
                });
            }
            records.push(record);
        }
        Ok(records)
    }

    // The record is handed back on both paths so a failure still reports
    // whatever the producer filled in.
    async fn produce(&self, task: &BackupTask, record: BackupRecord) -> (BackupRecord, Result<()>) {
        let (mut record, produced) = match record.kind {
            ArtifactKind::Database => {
                let mut record = record;
                let result = self.dump_database(task, &mut record).await;
                (record, result)
            }
            ArtifactKind::Files => self.archive_files(task, record).await,
        };
        if let Err(e) = produced {
            return (record, Err(e));
        }
        let finalized = self.finalize(task, &mut record).await;
        (record, finalized)
    }

    async fn dump_database(&self, task: &BackupTask, record: &mut BackupRecord) -> Result<()> {
        let producer = self
            .database
            .as_ref()
            .ok_or(BackupError::NotConfigured("Database"))?;
        producer.execute(task, record).await?;
        Ok(())
    }

    async fn archive_files(&self, task: &BackupTask, record: BackupRecord) -> (BackupRecord, Result<()>) {
        let producer = self.files.clone();
        let owned_task = task.clone();
        let fallback = record.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut record = record;
            let result = producer.execute(&owned_task, &mut record).map(|_| ());
            (record, result)
        })
        .await;
        match joined {
            Ok(pair) => pair,
            Err(e) => (fallback, Err(anyhow::anyhow!("File backup worker failed: {}", e))),
        }
    }

    async fn finalize(&self, task: &BackupTask, record: &mut BackupRecord) -> Result<()> {
        let mut artifact = record.artifact()?.to_path_buf();

        if record.kind == ArtifactKind::Database && task.compression_enabled {
            let source = artifact.clone();
            artifact = tokio::task::spawn_blocking(move || gzip_file(&source))
                .await
                .context("Compression worker failed")??;
            let compressed = std::fs::metadata(&artifact)
                .with_context(|| format!("Failed to stat {}", artifact.display()))?
                .len();
            record.backup_path = Some(artifact.clone());
            record.compressed_size = Some(compressed);
        }

        let to_hash = artifact.clone();
        let checksum = tokio::task::spawn_blocking(move || sha256_file(&to_hash))
            .await
            .context("Checksum worker failed")??;
        record.checksum = Some(checksum);

        let location = self
            .storage
            .upload(task, record)
            .await
            .with_context(|| format!("Failed to deliver {} to {} storage", artifact.display(), task.storage_type))?;
        record.storage_location = Some(location.to_string());

        record.complete(final_status(record), None);
        tracing::info!(
            task = %task.name,
            kind = record.kind.as_str(),
            status = ?record.status,
            size = %format_size(record.compressed_size.unwrap_or(record.backup_size)),
            duration = %format_duration(record.duration_secs.unwrap_or(0)),
            location = %location,
            "Artifact stored"
        );
        Ok(())
    }
}
