// mailbackup/src/backup/files.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use std::path::PathBuf;
use walkdir::WalkDir;

use super::archive::{ZipArchiveWriter, entry_name};
use super::exclude::ExcludePatterns;
use crate::config::SourcePaths;
use crate::errors::BackupError;
use crate::model::{BackupRecord, BackupScope, BackupTask};
use crate::utils::format::format_size;

/// Archives the mail system's file trees into a single zip per run.
#[derive(Debug, Clone)]
pub struct FileBackupProducer {
    sources: SourcePaths,
}

impl FileBackupProducer {
    pub fn new(sources: SourcePaths) -> Self {
        FileBackupProducer { sources }
    }

    /// Directories the task's scope covers, in archive order. Directories
    /// that do not exist are dropped with a warning.
    pub fn resolve_source_directories(&self, task: &BackupTask) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        match task.backup_scope {
            BackupScope::System => {
                if task.include_attachments {
                    dirs.push(self.sources.attachments.clone());
                }
                if task.include_logs {
                    dirs.push(self.sources.logs.clone());
                }
                dirs.push(self.sources.certificates.clone());
            }
            BackupScope::Folder => {
                let source = task.source_path.clone().ok_or_else(|| {
                    BackupError::MissingSourcePath {
                        task: task.name.clone(),
                    }
                })?;
                dirs.push(source);
            }
            BackupScope::Custom => {
                if task.include_attachments {
                    dirs.push(self.sources.attachments.clone());
                }
                if task.include_logs {
                    dirs.push(self.sources.logs.clone());
                }
            }
            BackupScope::User | BackupScope::Domain => {
                dirs.push(self.sources.attachments.clone());
            }
        }

        Ok(dirs
            .into_iter()
            .filter(|dir| {
                let exists = dir.is_dir();
                if !exists {
                    tracing::warn!(dir = %dir.display(), "Source directory does not exist, skipping");
                }
                exists
            })
            .collect())
    }

    /// Writes `files_<mode>_<timestamp>.zip` into the record's work directory
    /// and fills in path, size and file counters. Per-file failures are
    /// counted on the record; only archive-level failures are returned.
    pub fn execute(&self, task: &BackupTask, record: &mut BackupRecord) -> Result<PathBuf> {
        let source_dirs = self.resolve_source_directories(task)?;
        let excludes = ExcludePatterns::parse(task.exclude_patterns.as_deref());
        let since = record.mode.since();

        let archive_path = record.work_dir.join(format!(
            "files_{}_{}.zip",
            record.mode.label(),
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        tracing::info!(
            task = %task.name,
            archive = %archive_path.display(),
            sources = source_dirs.len(),
            "Starting file backup"
        );

        let mut writer = ZipArchiveWriter::create(&archive_path, task.compression_enabled)?;

        for dir in &source_dirs {
            for entry in WalkDir::new(dir).follow_links(false) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(dir = %dir.display(), error = %e, "Cannot read directory entry");
                        record.files_failed += 1;
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                if path == archive_path {
                    record.files_skipped += 1;
                    continue;
                }

                if excludes.is_excluded(path) {
                    record.files_skipped += 1;
                    continue;
                }

                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(file = %path.display(), error = %e, "Cannot stat file");
                        record.files_failed += 1;
                        continue;
                    }
                };
                let modified = match metadata.modified() {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(file = %path.display(), error = %e, "Cannot read modification time");
                        record.files_failed += 1;
                        continue;
                    }
                };

                if let Some(since) = since {
                    if DateTime::<Utc>::from(modified) < since {
                        record.files_skipped += 1;
                        continue;
                    }
                }

                if metadata.len() > self.sources.max_file_size {
                    tracing::warn!(
                        file = %path.display(),
                        size = %format_size(metadata.len()),
                        "File exceeds maximum size, skipping"
                    );
                    record.files_skipped += 1;
                    continue;
                }

                let added = entry_name(dir, path).and_then(|name| {
                    writer.append_file(path, &name, modified, metadata.len())
                });
                match added {
                    Ok(()) => record.files_processed += 1,
                    Err(e) => {
                        tracing::warn!(file = %path.display(), error = %format!("{:#}", e), "Failed to archive file");
                        record.files_failed += 1;
                    }
                }
            }
        }

        let size = writer
            .finish()
            .with_context(|| format!("File backup for task '{}' could not be finalised", task.name))?;
        record.backup_path = Some(archive_path.clone());
        record.backup_size = size;

        tracing::info!(
            task = %task.name,
            processed = record.files_processed,
            skipped = record.files_skipped,
            failed = record.files_failed,
            visited = record.total_files(),
            size = %format_size(size),
            "File backup completed"
        );
        Ok(archive_path)
    }
}
