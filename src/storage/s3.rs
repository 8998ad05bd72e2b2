// mailbackup/src/storage/s3.rs
use anyhow::{Context, Result};
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::S3Settings;

/// S3-compatible object store (AWS, DigitalOcean Spaces, MinIO) addressed
/// with static credentials from config.json.
pub struct S3Store {
    client: s3::Client,
    bucket: String,
}

impl S3Store {
    pub async fn connect(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &settings.access_key_id,
                &settings.secret_access_key,
                None,
                None,
                "Static",
            ));
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        S3Store {
            client: s3::Client::new(&sdk_config),
            bucket: settings.bucket_name.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn upload(&self, file_path: &Path, key: &str) -> Result<()> {
        tracing::info!(file = %file_path.display(), bucket = %self.bucket, key, "Uploading to S3");

        let body = ByteStream::from_path(file_path)
            .await
            .with_context(|| format!("Failed to create ByteStream from file: {}", file_path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to upload file {} to S3 bucket {} with key {}",
                    file_path.display(),
                    self.bucket,
                    key
                )
            })?;
        Ok(())
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete object s3://{}/{}", bucket, key))?;
        tracing::info!(bucket, key, "Deleted S3 object");
        Ok(())
    }

    /// Streams `s3://bucket/key` into `destination_path`.
    pub async fn download(&self, bucket: &str, key: &str, destination_path: &Path) -> Result<PathBuf> {
        let mut output_file = File::create(destination_path)
            .await
            .with_context(|| format!("Failed to create destination file: {}", destination_path.display()))?;

        let mut object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to get object s3://{}/{}", bucket, key))?;

        let mut downloaded = 0usize;
        while let Some(chunk) = object
            .body
            .try_next()
            .await
            .with_context(|| format!("Failed to read object body s3://{}/{}", bucket, key))?
        {
            output_file
                .write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write to destination file: {}", destination_path.display()))?;
            downloaded += chunk.len();
        }
        output_file.flush().await?;

        tracing::info!(bytes = downloaded, bucket, key, "Downloaded S3 object");
        Ok(destination_path.to_path_buf())
    }
}
