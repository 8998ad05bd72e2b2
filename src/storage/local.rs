// mailbackup/src/storage/local.rs
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Copies `source` into `target_dir`, creating the directory and replacing
/// an existing file of the same name. Returns `<target_dir>/<file name>`.
pub async fn upload(source: &Path, target_dir: &Path) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .with_context(|| format!("Artifact path has no file name: {}", source.display()))?;

    fs::create_dir_all(target_dir)
        .await
        .with_context(|| format!("Failed to create storage directory {}", target_dir.display()))?;

    let target = target_dir.join(file_name);
    fs::copy(source, &target).await.with_context(|| {
        format!("Failed to copy {} to {}", source.display(), target.display())
    })?;
    tracing::info!(target = %target.display(), "Stored artifact locally");
    Ok(target)
}

/// Removes a stored file; a file that is already gone is not an error.
pub async fn delete(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Deleted stored artifact");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
    }
}

pub async fn fetch(stored: &Path, destination: &Path) -> Result<PathBuf> {
    fs::copy(stored, destination).await.with_context(|| {
        format!("Failed to copy {} to {}", stored.display(), destination.display())
    })?;
    Ok(destination.to_path_buf())
}

/// The path exists, or its parent is a writable directory.
pub fn test_connection(path: &Path) -> bool {
    if path.exists() {
        return true;
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::metadata(parent)
        .map(|m| m.is_dir() && !m.permissions().readonly())
        .unwrap_or(false)
}
