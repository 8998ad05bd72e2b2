// mailbackup/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::model::BackupTask;
use crate::utils::validate_identifier;

const DEFAULT_WORK_DIRECTORY: &str = "/tmp/backups";
const DEFAULT_ATTACHMENTS_PATH: &str = "/opt/mail/attachments";
const DEFAULT_LOGS_PATH: &str = "/opt/mail/logs";
const DEFAULT_CERTIFICATES_PATH: &str = "/opt/mail/certificates";
const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;
const DEFAULT_DUMP_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_MYSQL_PORT: u16 = 3306;
const PASSWORD_ENV_VAR: &str = "BACKUP_DB_PASSWORD";

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonDatabaseConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bin_path: Option<PathBuf>,
    pub dump_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonPathsConfig {
    pub work_directory: Option<PathBuf>,
    pub attachments_path: Option<PathBuf>,
    pub logs_path: Option<PathBuf>,
    pub certificates_path: Option<PathBuf>,
    pub max_file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonFtpConfig {
    pub host: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonStorageConfig {
    pub ftp: Option<JsonFtpConfig>,
    pub s3_storage: Option<JsonS3StorageConfig>,
    pub simulated_latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub database: Option<JsonDatabaseConfig>,
    pub paths: Option<JsonPathsConfig>,
    pub storage: Option<JsonStorageConfig>,
    #[serde(default)]
    pub tasks: Vec<BackupTask>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub database_name: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bin_path: Option<PathBuf>,
    pub dump_timeout: Duration,
}

/// Fixed source trees of the mail system plus the per-file size cap.
#[derive(Debug, Clone)]
pub struct SourcePaths {
    pub attachments: PathBuf,
    pub logs: PathBuf,
    pub certificates: PathBuf,
    pub max_file_size: u64,
}

impl Default for SourcePaths {
    fn default() -> Self {
        SourcePaths {
            attachments: PathBuf::from(DEFAULT_ATTACHMENTS_PATH),
            logs: PathBuf::from(DEFAULT_LOGS_PATH),
            certificates: PathBuf::from(DEFAULT_CERTIFICATES_PATH),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FtpSettings {
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StorageSettings {
    pub ftp: Option<FtpSettings>,
    pub s3: Option<S3Settings>,
    /// Overrides the per-backend latency of the simulated remote backends.
    pub simulated_latency: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: Option<DatabaseSettings>,
    pub work_directory: PathBuf,
    pub sources: SourcePaths,
    pub storage: StorageSettings,
    pub tasks: Vec<BackupTask>,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;
        Self::from_raw(raw_json_config)
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let database = match &raw.database {
            Some(db) => Some(DatabaseSettings::from_json(db).context("Invalid 'database' section")?),
            None => None,
        };

        let paths = raw.paths.as_ref();
        let defaults = SourcePaths::default();
        let sources = SourcePaths {
            attachments: paths
                .and_then(|p| p.attachments_path.clone())
                .unwrap_or(defaults.attachments),
            logs: paths.and_then(|p| p.logs_path.clone()).unwrap_or(defaults.logs),
            certificates: paths
                .and_then(|p| p.certificates_path.clone())
                .unwrap_or(defaults.certificates),
            max_file_size: paths
                .and_then(|p| p.max_file_size)
                .unwrap_or(defaults.max_file_size),
        };
        let work_directory = paths
            .and_then(|p| p.work_directory.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIRECTORY));
        if work_directory.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("paths.work_directory cannot be empty in config.json."));
        }

        let storage = raw
            .storage
            .as_ref()
            .map(load_storage_settings)
            .unwrap_or_default();

        for (i, task) in raw.tasks.iter().enumerate() {
            if raw.tasks[..i].iter().any(|t| t.name == task.name) {
                return Err(anyhow::anyhow!("Duplicate task name in config.json: {}", task.name));
            }
        }

        Ok(AppConfig {
            database,
            work_directory,
            sources,
            storage,
            tasks: raw.tasks,
        })
    }

    pub fn find_task(&self, name: &str) -> Result<&BackupTask> {
        self.tasks
            .iter()
            .find(|t| t.name == name)
            .with_context(|| format!("No task named '{}' in config.json", name))
    }
}

impl DatabaseSettings {
    pub fn from_json(json: &JsonDatabaseConfig) -> Result<Self> {
        let url_str = json
            .url
            .as_ref()
            .filter(|s| !s.trim().is_empty())
            .context("database.url must be set in config.json")?;
        let url = Url::parse(url_str)
            .with_context(|| format!("Invalid database URL format: {}", redact_url(url_str)))?;
        let database_name = get_db_name_from_url(&url)?;
        validate_identifier(&database_name)?;

        let username = json
            .username
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| Some(url.username().to_string()).filter(|s| !s.is_empty()));
        let password = json
            .password
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| url.password().map(str::to_string))
            .or_else(|| env::var(PASSWORD_ENV_VAR).ok().filter(|s| !s.is_empty()));

        Ok(DatabaseSettings {
            url: url_str.clone(),
            database_name,
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(DEFAULT_MYSQL_PORT),
            username,
            password,
            bin_path: json.bin_path.clone(),
            dump_timeout: Duration::from_secs(
                json.dump_timeout_secs.unwrap_or(DEFAULT_DUMP_TIMEOUT_SECS),
            ),
        })
    }
}

fn load_storage_settings(json: &JsonStorageConfig) -> StorageSettings {
    let ftp = json.ftp.as_ref().and_then(|ftp| {
        ftp.host
            .as_ref()
            .filter(|h| !h.is_empty())
            .map(|host| FtpSettings { host: host.clone() })
    });

    let s3 = json.s3_storage.as_ref().and_then(|s3_raw| {
        if let (Some(bucket), Some(region), Some(key_id), Some(secret)) = (
            s3_raw.bucket_name.as_ref().filter(|s| !s.is_empty()),
            s3_raw.region.as_ref().filter(|s| !s.is_empty()),
            s3_raw.access_key_id.as_ref().filter(|s| !s.is_empty()),
            s3_raw.secret_access_key.as_ref().filter(|s| !s.is_empty()),
        ) {
            Some(S3Settings {
                bucket_name: bucket.clone(),
                region: region.clone(),
                access_key_id: key_id.clone(),
                secret_access_key: secret.clone(),
                endpoint_url: s3_raw.endpoint_url.clone().filter(|s| !s.is_empty()),
            })
        } else {
            // Only warn if some S3 fields were provided but were incomplete/empty
            if s3_raw.bucket_name.is_some()
                || s3_raw.region.is_some()
                || s3_raw.access_key_id.is_some()
                || s3_raw.secret_access_key.is_some()
            {
                tracing::warn!(
                    "S3 configuration is present in config.json but some required fields (bucket_name, region, access_key_id, secret_access_key) are missing or empty. S3 operations will be disabled."
                );
            }
            None
        }
    });

    StorageSettings {
        ftp,
        s3,
        simulated_latency: json.simulated_latency_ms.map(Duration::from_millis),
    }
}

/// Extracts the database name from a MySQL connection URL.
pub fn get_db_name_from_url(url: &Url) -> Result<String> {
    let path = url.path().trim_start_matches('/');
    if path.is_empty() {
        Err(anyhow::anyhow!(
            "Database name not found in URL path: {}",
            redact_url(url.as_str())
        ))
    } else {
        Ok(path.to_string())
    }
}

/// Replaces the password of a connection URL so it can be logged.
pub fn redact_url(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("****"));
            url.to_string()
        }
        Ok(url) => url.to_string(),
        Err(_) => "<unparseable url>".to_string(),
    }
}
