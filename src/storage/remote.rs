// mailbackup/src/storage/remote.rs
//! Backends without a client yet. They honour the location contract and
//! stand in for network time with a fixed delay.
use std::time::Duration;

use super::location::StorageLocation;
use crate::model::StorageType;

pub fn default_latency(storage_type: StorageType) -> Duration {
    let millis = match storage_type {
        StorageType::Ftp | StorageType::Sftp => 1000,
        StorageType::Azure | StorageType::GoogleCloud => 2000,
        StorageType::Webdav => 1500,
        StorageType::Local | StorageType::S3 => 0,
    };
    Duration::from_millis(millis)
}

pub async fn upload(location: &StorageLocation, latency: Duration) {
    tracing::info!(location = %location, "Simulating remote upload");
    tokio::time::sleep(latency).await;
}

pub fn delete(location: &StorageLocation) {
    tracing::info!(location = %location, "Remote delete is not implemented for this backend; nothing removed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_latency_per_backend() {
        assert_eq!(default_latency(StorageType::Ftp), Duration::from_secs(1));
        assert_eq!(default_latency(StorageType::GoogleCloud), Duration::from_secs(2));
        assert_eq!(default_latency(StorageType::Webdav), Duration::from_millis(1500));
    }
}
