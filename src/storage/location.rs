// mailbackup/src/storage/location.rs
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::BackupError;

/// Where a stored artifact lives. Displays as the URI persisted on the
/// record and parses back from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// Plain filesystem path; `file://` is accepted when parsing.
    Local(PathBuf),
    Ftp { host: String, path: String },
    Sftp { host: String, path: String },
    S3 { bucket: String, key: String },
    Azure(String),
    GoogleCloud(String),
    Webdav(String),
}

/// `<storage_path>/<file_name>` with surrounding slashes trimmed from the
/// prefix, used as the object key or remote path of non-local backends.
pub fn object_key(storage_path: &str, file_name: &str) -> String {
    let prefix = storage_path.trim_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", prefix, file_name)
    }
}

fn split_host(rest: &str, uri: &str) -> Result<(String, String), BackupError> {
    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
    if host.is_empty() || path.is_empty() {
        return Err(BackupError::UnsupportedLocation(uri.to_string()));
    }
    Ok((host.to_string(), path.to_string()))
}

fn non_empty(rest: &str, uri: &str) -> Result<String, BackupError> {
    if rest.is_empty() {
        Err(BackupError::UnsupportedLocation(uri.to_string()))
    } else {
        Ok(rest.to_string())
    }
}

const SCHEMES: [&str; 7] = ["file", "ftp", "sftp", "s3", "azure", "gs", "webdav"];

impl FromStr for StorageLocation {
    type Err = BackupError;

    /// Only the known scheme prefixes make a URI; anything else, including a
    /// path that happens to contain `://`, is a local path.
    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let known = uri
            .split_once("://")
            .filter(|(scheme, _)| SCHEMES.contains(scheme));
        let Some((scheme, rest)) = known else {
            return non_empty(uri, uri).map(|p| StorageLocation::Local(PathBuf::from(p)));
        };
        match scheme {
            "file" => non_empty(rest, uri).map(|p| StorageLocation::Local(PathBuf::from(p))),
            "ftp" => split_host(rest, uri).map(|(host, path)| StorageLocation::Ftp { host, path }),
            "sftp" => split_host(rest, uri).map(|(host, path)| StorageLocation::Sftp { host, path }),
            "s3" => split_host(rest, uri).map(|(bucket, key)| StorageLocation::S3 { bucket, key }),
            "azure" => non_empty(rest, uri).map(StorageLocation::Azure),
            "gs" => non_empty(rest, uri).map(StorageLocation::GoogleCloud),
            "webdav" => non_empty(rest, uri).map(StorageLocation::Webdav),
            _ => Err(BackupError::UnsupportedLocation(uri.to_string())),
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::Local(path) => write!(f, "{}", path.display()),
            StorageLocation::Ftp { host, path } => write!(f, "ftp://{}/{}", host, path),
            StorageLocation::Sftp { host, path } => write!(f, "sftp://{}/{}", host, path),
            StorageLocation::S3 { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
            StorageLocation::Azure(blob) => write!(f, "azure://{}", blob),
            StorageLocation::GoogleCloud(object) => write!(f, "gs://{}", object),
            StorageLocation::Webdav(path) => write!(f, "webdav://{}", path),
        }
    }
}
