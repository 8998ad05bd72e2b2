// mailbackup/src/model/task.rs
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// What a run covers and how it picks the reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupType {
    Full,
    Incremental,
    Differential,
    DatabaseOnly,
    FilesOnly,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Incremental => "incremental",
            BackupType::Differential => "differential",
            BackupType::DatabaseOnly => "database_only",
            BackupType::FilesOnly => "files_only",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupScope {
    System,
    User,
    Domain,
    Folder,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageType {
    Local,
    Ftp,
    Sftp,
    S3,
    Azure,
    GoogleCloud,
    Webdav,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageType::Local => "LOCAL",
            StorageType::Ftp => "FTP",
            StorageType::Sftp => "SFTP",
            StorageType::S3 => "S3",
            StorageType::Azure => "AZURE",
            StorageType::GoogleCloud => "GOOGLE_CLOUD",
            StorageType::Webdav => "WEBDAV",
        };
        f.write_str(name)
    }
}

/// Mode of a single producer invocation. Incremental and differential carry
/// the reference time chosen by the caller; the producers treat them alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "since", rename_all = "snake_case")]
pub enum BackupMode {
    Full,
    Incremental(DateTime<Utc>),
    Differential(DateTime<Utc>),
}

impl BackupMode {
    pub fn label(&self) -> &'static str {
        match self {
            BackupMode::Full => "full",
            BackupMode::Incremental(_) => "incremental",
            BackupMode::Differential(_) => "differential",
        }
    }

    pub fn since(&self) -> Option<DateTime<Utc>> {
        match self {
            BackupMode::Full => None,
            BackupMode::Incremental(t) | BackupMode::Differential(t) => Some(*t),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> u32 {
    30
}

/// Stored configuration of a backup job. The backup core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupTask {
    pub name: String,
    pub backup_type: BackupType,
    pub backup_scope: BackupScope,
    pub storage_type: StorageType,
    /// Destination directory, bucket prefix or remote path root.
    pub storage_path: String,
    /// Source tree for FOLDER scope.
    #[serde(default)]
    pub source_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub compression_enabled: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_true")]
    pub include_attachments: bool,
    #[serde(default)]
    pub include_logs: bool,
    /// Comma separated: `*.tmp`, `cache*`, or a plain substring of the path.
    #[serde(default)]
    pub exclude_patterns: Option<String>,
}

impl BackupTask {
    pub fn new(
        name: &str,
        backup_type: BackupType,
        backup_scope: BackupScope,
        storage_type: StorageType,
        storage_path: &str,
    ) -> Self {
        BackupTask {
            name: name.to_string(),
            backup_type,
            backup_scope,
            storage_type,
            storage_path: storage_path.to_string(),
            source_path: None,
            compression_enabled: true,
            retention_days: default_retention_days(),
            include_attachments: true,
            include_logs: false,
            exclude_patterns: None,
        }
    }

    /// Every scope except FOLDER includes the mail database.
    pub fn includes_database(&self) -> bool {
        self.backup_scope != BackupScope::Folder
    }

    /// Whether the scope resolves at least one source directory.
    pub fn includes_files(&self) -> bool {
        match self.backup_scope {
            BackupScope::System | BackupScope::Folder | BackupScope::User | BackupScope::Domain => {
                true
            }
            BackupScope::Custom => self.include_attachments || self.include_logs,
        }
    }

    /// `<task name, whitespace as _>_<type>_<timestamp to the millisecond>`
    pub fn backup_name(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{}",
            WHITESPACE.replace_all(self.name.trim(), "_"),
            self.backup_type.as_str(),
            now.format("%Y%m%d%H%M%S%3f")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_task_deserializes_with_defaults() -> anyhow::Result<()> {
        let task: BackupTask = serde_json::from_value(json!({
            "name": "nightly",
            "backup_type": "FULL",
            "backup_scope": "SYSTEM",
            "storage_type": "GOOGLE_CLOUD",
            "storage_path": "mail/backups"
        }))?;

        assert_eq!(task.storage_type, StorageType::GoogleCloud);
        assert!(task.compression_enabled);
        assert!(task.include_attachments);
        assert!(!task.include_logs);
        assert_eq!(task.retention_days, 30);
        assert!(task.source_path.is_none());
        Ok(())
    }

    #[test]
    fn test_scope_decides_database_and_files() {
        let mut task = BackupTask::new("t", BackupType::Full, BackupScope::Custom, StorageType::Local, "/b");
        task.include_attachments = false;
        task.include_logs = false;
        assert!(task.includes_database());
        assert!(!task.includes_files());

        task.backup_scope = BackupScope::Folder;
        assert!(!task.includes_database());
        assert!(task.includes_files());

        task.backup_scope = BackupScope::System;
        assert!(task.includes_files(), "certificates are always part of SYSTEM");
    }

    #[test]
    fn test_backup_name_replaces_whitespace() {
        let task = BackupTask::new(
            "mail  server nightly",
            BackupType::Incremental,
            BackupScope::System,
            StorageType::Local,
            "/b",
        );
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 4, 5, 6).unwrap();
        assert_eq!(task.backup_name(now), "mail_server_nightly_incremental_20240309040506000");
    }

    #[test]
    fn test_runs_within_one_second_get_distinct_names() {
        let task = BackupTask::new("nightly", BackupType::Full, BackupScope::System, StorageType::Local, "/b");
        let first = Utc.with_ymd_and_hms(2024, 3, 9, 4, 5, 6).unwrap();
        let second = first + chrono::Duration::milliseconds(250);
        assert_eq!(task.backup_name(second), "nightly_full_20240309040506250");
        assert_ne!(task.backup_name(first), task.backup_name(second));
    }

    #[test]
    fn test_mode_since() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(BackupMode::Full.since(), None);
        assert_eq!(BackupMode::Incremental(t).since(), Some(t));
        assert_eq!(BackupMode::Differential(t).label(), "differential");
    }
}
