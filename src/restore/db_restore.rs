// mailbackup/src/restore/db_restore.rs
use anyhow::{Context, Result};
use std::fs::File;
use std::process::Stdio;
use tokio::process::Command;

use super::check_artifact;
use crate::backup::archive::{gunzip_to_temp, is_gzip};
use crate::config::DatabaseSettings;
use crate::errors::BackupError;
use crate::model::BackupRecord;
use crate::utils::process::run_with_timeout;
use crate::utils::{find_executable, validate_identifier};

/// Arguments for `mysql` reading a dump on stdin into the configured database.
pub fn restore_args(settings: &DatabaseSettings) -> Result<Vec<String>> {
    validate_identifier(&settings.database_name)?;
    let mut args = vec![
        format!("--host={}", settings.host),
        format!("--port={}", settings.port),
    ];
    if let Some(user) = &settings.username {
        args.push(format!("--user={}", user));
    }
    args.push(settings.database_name.clone());
    Ok(args)
}

/// Pipes the record's dump into `mysql`. Compressed dumps are inflated to a
/// temporary file first. An empty or missing dump fails before any process
/// is started.
pub async fn restore_database(settings: &DatabaseSettings, record: &mut BackupRecord) -> Result<()> {
    let artifact = record.artifact()?.to_path_buf();
    check_artifact(&artifact)?;

    let decompressed = if is_gzip(&artifact) {
        let source = artifact.clone();
        let temp = tokio::task::spawn_blocking(move || gunzip_to_temp(&source))
            .await
            .context("Decompression worker failed")??;
        Some(temp)
    } else {
        None
    };
    let sql_path = decompressed
        .as_ref()
        .map(|temp| temp.path().to_path_buf())
        .unwrap_or_else(|| artifact.clone());
    if std::fs::metadata(&sql_path)?.len() == 0 {
        return Err(BackupError::EmptyArtifact(artifact).into());
    }

    let mysql = find_executable(settings.bin_path.as_deref(), "mysql")?;
    let input = File::open(&sql_path)
        .with_context(|| format!("Failed to open dump {}", sql_path.display()))?;

    tracing::info!(
        dump = %artifact.display(),
        database = %settings.database_name,
        "Restoring database from dump"
    );
    let mut command = Command::new(&mysql);
    command
        .args(restore_args(settings)?)
        .stdin(Stdio::from(input))
        .stdout(Stdio::null());
    if let Some(password) = &settings.password {
        command.env("MYSQL_PWD", password);
    }
    run_with_timeout(command, settings.dump_timeout)
        .await
        .with_context(|| format!("Database restore from {} failed", artifact.display()))?;

    record.increment_restored_count();
    tracing::info!(
        database = %settings.database_name,
        restored_count = record.restored_count,
        "Database restore completed"
    );
    Ok(())
}
