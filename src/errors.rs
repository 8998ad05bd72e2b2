use std::path::PathBuf;

use thiserror::Error;

use crate::model::{BackupRecord, RunStatus};

/// Conditions the backup/restore flows surface as typed errors so callers
/// can tell them apart from plain I/O or context-wrapped failures.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Task '{task}' uses FOLDER scope but has no source_path")]
    MissingSourcePath { task: String },

    #[error("Task '{task}' has nothing to back up for its type and scope")]
    NothingToBackUp { task: String },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Command {program} failed with status {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Command {program} did not finish within {secs}s and was killed")]
    CommandTimedOut { program: String, secs: u64 },

    #[error("Backup artifact is empty: {}", .0.display())]
    EmptyArtifact(PathBuf),

    #[error("Backup artifact is missing: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Unsupported storage location: {0}")]
    UnsupportedLocation(String),

    #[error("Backup {backup} cannot be restored: run ended {status:?}")]
    RunNotRestorable { backup: String, status: RunStatus },
}

/// A run that aborted. The records produced so far (the last one marked
/// FAILED) travel with the error so the caller can persist them.
#[derive(Error, Debug)]
#[error("Backup run for task '{task}' failed: {source:#}")]
pub struct RunFailed {
    pub task: String,
    pub records: Vec<BackupRecord>,
    #[source]
    pub source: anyhow::Error,
}
