// mailbackup/src/storage/mod.rs
pub mod local;
pub mod location;
pub mod remote;
pub mod s3;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::StorageSettings;
use crate::errors::BackupError;
use crate::model::{BackupRecord, BackupTask, StorageType};
pub use location::StorageLocation;
use location::object_key;
use s3::S3Store;

/// Delivers finished artifacts to the task's storage backend and removes
/// them again by the location recorded at upload time.
#[derive(Debug, Clone)]
pub struct StorageService {
    settings: StorageSettings,
}

impl StorageService {
    pub fn new(settings: StorageSettings) -> Self {
        StorageService { settings }
    }

    fn latency(&self, storage_type: StorageType) -> std::time::Duration {
        self.settings
            .simulated_latency
            .unwrap_or_else(|| remote::default_latency(storage_type))
    }

    async fn s3_store(&self) -> Result<S3Store> {
        let settings = self
            .settings
            .s3
            .as_ref()
            .ok_or(BackupError::NotConfigured("S3 storage"))?;
        Ok(S3Store::connect(settings).await)
    }

    fn ftp_host(&self) -> Result<String> {
        self.settings
            .ftp
            .as_ref()
            .map(|ftp| ftp.host.clone())
            .ok_or_else(|| BackupError::NotConfigured("FTP host").into())
    }

    /// Stores the record's artifact according to the task's backend and
    /// returns where it now lives.
    pub async fn upload(&self, task: &BackupTask, record: &BackupRecord) -> Result<StorageLocation> {
        let artifact = record.artifact()?;
        let file_name = artifact
            .file_name()
            .with_context(|| format!("Artifact path has no file name: {}", artifact.display()))?
            .to_string_lossy()
            .into_owned();
        let key = object_key(&task.storage_path, &file_name);

        let location = match task.storage_type {
            StorageType::Local => {
                let stored = local::upload(artifact, Path::new(&task.storage_path)).await?;
                return Ok(StorageLocation::Local(stored));
            }
            StorageType::S3 => {
                let store = self.s3_store().await?;
                store.upload(artifact, &key).await?;
                return Ok(StorageLocation::S3 {
                    bucket: store.bucket().to_string(),
                    key,
                });
            }
            StorageType::Ftp => StorageLocation::Ftp {
                host: self.ftp_host()?,
                path: key,
            },
            StorageType::Sftp => StorageLocation::Sftp {
                host: self.ftp_host()?,
                path: key,
            },
            StorageType::Azure => StorageLocation::Azure(key),
            StorageType::GoogleCloud => StorageLocation::GoogleCloud(key),
            StorageType::Webdav => StorageLocation::Webdav(key),
        };
        remote::upload(&location, self.latency(task.storage_type)).await;
        Ok(location)
    }

    /// Deletes the stored copy named by `record.storage_location`.
    pub async fn delete(&self, record: &BackupRecord) -> Result<()> {
        let Some(uri) = record.storage_location.as_deref() else {
            tracing::debug!(backup = %record.backup_name, "Record has no storage location, nothing to delete");
            return Ok(());
        };
        match uri.parse::<StorageLocation>()? {
            StorageLocation::Local(path) => local::delete(&path).await,
            StorageLocation::S3 { bucket, key } => self.s3_store().await?.delete(&bucket, &key).await,
            other => {
                remote::delete(&other);
                Ok(())
            }
        }
    }

    /// Copies a stored artifact back to `destination`. Only backends with a
    /// real client can do this.
    pub async fn fetch(&self, location: &StorageLocation, destination: &Path) -> Result<PathBuf> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory for download: {}", parent.display()))?;
        }
        match location {
            StorageLocation::Local(path) => local::fetch(path, destination).await,
            StorageLocation::S3 { bucket, key } => {
                self.s3_store().await?.download(bucket, key, destination).await
            }
            other => Err(BackupError::UnsupportedLocation(other.to_string()).into()),
        }
    }

    /// Cheap reachability check; never fails, only answers false.
    pub fn test_connection(&self, storage_type: StorageType, storage_path: &str) -> bool {
        match storage_type {
            StorageType::Local => local::test_connection(Path::new(storage_path)),
            StorageType::Ftp | StorageType::Sftp => self.settings.ftp.is_some(),
            StorageType::S3 => self.settings.s3.is_some(),
            StorageType::Azure | StorageType::GoogleCloud | StorageType::Webdav => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FtpSettings;
    use crate::model::{ArtifactKind, BackupMode, BackupScope, BackupType};
    use std::time::Duration;

    fn service() -> StorageService {
        StorageService::new(StorageSettings {
            ftp: Some(FtpSettings {
                host: "ftp.example.com".to_string(),
            }),
            s3: None,
            simulated_latency: Some(Duration::ZERO),
        })
    }

    fn record_with_artifact(task: &BackupTask, artifact: &Path) -> BackupRecord {
        let mut record = BackupRecord::new(task, "run", ArtifactKind::Files, BackupMode::Full, Path::new("/tmp"));
        record.backup_path = Some(artifact.to_path_buf());
        record
    }

    #[tokio::test]
    async fn test_local_upload_into_missing_dir_returns_target_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let artifact = dir.path().join("files_full_20240501_120000.zip");
        std::fs::write(&artifact, b"PK")?;
        let target_dir = dir.path().join("storage").join("mail");
        let task = BackupTask::new(
            "t",
            BackupType::Full,
            BackupScope::System,
            StorageType::Local,
            &target_dir.to_string_lossy(),
        );
        let mut record = record_with_artifact(&task, &artifact);

        let location = service().upload(&task, &record).await?;

        let expected = target_dir.join("files_full_20240501_120000.zip");
        assert_eq!(location, StorageLocation::Local(expected.clone()));
        assert_eq!(location.to_string(), expected.display().to_string());
        assert!(expected.is_file());

        record.storage_location = Some(location.to_string());
        service().delete(&record).await?;
        assert!(!expected.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_remote_stubs_format_uris() -> anyhow::Result<()> {
        let artifact = Path::new("/tmp/work/database_full_20240501_120000.sql.gz");
        let cases = [
            (StorageType::Ftp, "ftp://ftp.example.com/mail/nightly/database_full_20240501_120000.sql.gz"),
            (StorageType::Sftp, "sftp://ftp.example.com/mail/nightly/database_full_20240501_120000.sql.gz"),
            (StorageType::Azure, "azure://mail/nightly/database_full_20240501_120000.sql.gz"),
            (StorageType::GoogleCloud, "gs://mail/nightly/database_full_20240501_120000.sql.gz"),
            (StorageType::Webdav, "webdav://mail/nightly/database_full_20240501_120000.sql.gz"),
        ];
        for (storage_type, expected) in cases {
            let task = BackupTask::new("t", BackupType::Full, BackupScope::System, storage_type, "/mail/nightly");
            let record = record_with_artifact(&task, artifact);
            let location = service().upload(&task, &record).await?;
            assert_eq!(location.to_string(), expected);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_s3_without_settings_is_not_configured() {
        let task = BackupTask::new("t", BackupType::Full, BackupScope::System, StorageType::S3, "nightly");
        let record = record_with_artifact(&task, Path::new("/tmp/a.zip"));
        let err = service().upload(&task, &record).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackupError>(),
            Some(BackupError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_rejects_malformed_location() {
        let task = BackupTask::new("t", BackupType::Full, BackupScope::System, StorageType::Local, "/b");
        let mut record = record_with_artifact(&task, Path::new("/tmp/a.zip"));
        record.storage_location = Some("s3://bucket-without-key".to_string());
        let err = service().delete(&record).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackupError>(),
            Some(BackupError::UnsupportedLocation(_))
        ));
    }

    #[test]
    fn test_connection_per_backend() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let svc = service();
        assert!(svc.test_connection(StorageType::Local, &dir.path().to_string_lossy()));
        assert!(svc.test_connection(StorageType::Ftp, ""));
        assert!(!svc.test_connection(StorageType::S3, "nightly"));
        assert!(svc.test_connection(StorageType::Webdav, ""));

        let bare = StorageService::new(StorageSettings::default());
        assert!(!bare.test_connection(StorageType::Sftp, ""));
        Ok(())
    }
}
