pub(crate) mod archive;
pub(crate) mod catalog;
pub(crate) mod db_dump;
pub(crate) mod exclude;
pub(crate) mod files;
pub(crate) mod logic;
pub(crate) mod retention;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::model::BackupRecord;
use crate::storage::StorageService;

/// Runs one backup of `task_name` and persists a manifest per produced
/// artifact in the work directory, failed ones included. Without an explicit
/// `reference`, incremental and differential runs take theirs from the
/// task's earlier manifests.
pub async fn run_backup_flow(
    app_config: &AppConfig,
    task_name: &str,
    reference: Option<DateTime<Utc>>,
) -> Result<Vec<BackupRecord>> {
    let task = app_config.find_task(task_name)?;
    let reference = match reference {
        Some(reference) => Some(reference),
        None => {
            let history: Vec<BackupRecord> =
                retention::load_task_manifests(&app_config.work_directory, &task.name)?
                    .into_iter()
                    .map(|(_, record)| record)
                    .collect();
            let derived = logic::reference_from_history(task, &history);
            if let Some(since) = derived {
                tracing::info!(task = %task.name, %since, "Using reference time from earlier runs");
            }
            derived
        }
    };
    let orchestrator = logic::BackupOrchestrator::from_config(app_config)?;

    match orchestrator.execute(task, reference).await {
        Ok(records) => {
            for record in &records {
                let manifest = record.save_manifest(&app_config.work_directory)?;
                println!("📄 Manifest written to {}", manifest.display());
            }
            Ok(records)
        }
        Err(failed) => {
            for record in &failed.records {
                if let Err(e) = record.save_manifest(&app_config.work_directory) {
                    tracing::error!(backup = %record.backup_name, error = %format!("{:#}", e), "Could not persist failed record");
                }
            }
            Err(failed.into())
        }
    }
}

/// Removes the task's backups that are older than its retention period.
pub async fn run_cleanup_flow(app_config: &AppConfig, task_name: &str) -> Result<retention::CleanupSummary> {
    let task = app_config.find_task(task_name)?;
    let storage = StorageService::new(app_config.storage.clone());
    retention::cleanup_expired(&storage, task, &app_config.work_directory, Utc::now())
        .await
        .with_context(|| format!("Retention cleanup for task '{}' failed", task_name))
}
