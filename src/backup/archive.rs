// mailbackup/src/backup/archive.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, Timelike};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Streams files into a zip archive, one entry per file.
pub struct ZipArchiveWriter {
    zip: ZipWriter<File>,
    path: PathBuf,
    method: CompressionMethod,
}

impl ZipArchiveWriter {
    pub fn create(archive_dest_path: &Path, deflate: bool) -> Result<Self> {
        if let Some(parent) = archive_dest_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for archive: {}",
                        parent.display()
                    )
                })?;
            }
        }
        let archive_file = File::create(archive_dest_path).with_context(|| {
            format!("Failed to create archive file: {}", archive_dest_path.display())
        })?;
        Ok(ZipArchiveWriter {
            zip: ZipWriter::new(archive_file),
            path: archive_dest_path.to_path_buf(),
            method: if deflate {
                CompressionMethod::Deflated
            } else {
                CompressionMethod::Stored
            },
        })
    }

    /// Copies `source` into the archive as `entry_name`. On failure the
    /// partially written entry is dropped so the archive stays readable.
    pub fn append_file(
        &mut self,
        source: &Path,
        entry_name: &str,
        modified: SystemTime,
        size: u64,
    ) -> Result<()> {
        let mut reader = File::open(source)
            .with_context(|| format!("Failed to open {}", source.display()))?;

        let options = SimpleFileOptions::default()
            .compression_method(self.method)
            .last_modified_time(zip_time(modified))
            .large_file(size >= u32::MAX as u64);
        self.zip
            .start_file(entry_name, options)
            .with_context(|| format!("Failed to start archive entry {}", entry_name))?;

        if let Err(e) = io::copy(&mut reader, &mut self.zip) {
            self.zip
                .abort_file()
                .with_context(|| format!("Failed to drop partial archive entry {}", entry_name))?;
            return Err(e).with_context(|| format!("Failed to copy {} into archive", source.display()));
        }
        Ok(())
    }

    /// Finalises the central directory and returns the archive size.
    pub fn finish(self) -> Result<u64> {
        let path = self.path;
        self.zip
            .finish()
            .with_context(|| format!("Failed to finish zip archive: {}", path.display()))?;
        let size = fs::metadata(&path)
            .with_context(|| format!("Failed to stat archive {}", path.display()))?
            .len();
        Ok(size)
    }
}

/// Archive entry name for `path` under `root`, with `/` separators.
pub fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).with_context(|| {
        format!(
            "Failed to strip prefix {} from {}",
            root.display(),
            path.display()
        )
    })?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        anyhow::bail!("{} has no path below {}", path.display(), root.display());
    }
    Ok(parts.join("/"))
}

// Zip stores local wall-clock time; dates before 1980 are clamped.
fn zip_time(modified: SystemTime) -> zip::DateTime {
    let local: DateTime<Local> = modified.into();
    zip::DateTime::from_date_and_time(
        local.year().clamp(1980, 2107) as u16,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .unwrap_or_default()
}

/// Extracts a zip archive into `extract_to_dir`, returning the entry count.
/// Entries whose names would escape the directory are rejected by the zip reader.
pub fn extract_zip_archive(archive_path: &Path, extract_to_dir: &Path) -> Result<usize> {
    if !archive_path.is_file() {
        return Err(anyhow::anyhow!(
            "Archive for extraction is not a file: {}",
            archive_path.display()
        ));
    }
    fs::create_dir_all(extract_to_dir).with_context(|| {
        format!(
            "Failed to create extraction directory: {}",
            extract_to_dir.display()
        )
    })?;

    let archive_file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive file: {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(archive_file)
        .with_context(|| format!("Failed to read zip archive: {}", archive_path.display()))?;
    let entries = archive.len();
    archive.extract(extract_to_dir).with_context(|| {
        format!(
            "Failed to unpack archive {} to {}",
            archive_path.display(),
            extract_to_dir.display()
        )
    })?;
    Ok(entries)
}

/// Gzips `source` into `<source>.gz`, removes the original and returns the new path.
pub fn gzip_file(source: &Path) -> Result<PathBuf> {
    let mut target = source.as_os_str().to_owned();
    target.push(".gz");
    let target = PathBuf::from(target);

    let mut input = File::open(source)
        .with_context(|| format!("Failed to open {} for compression", source.display()))?;
    let output = File::create(&target)
        .with_context(|| format!("Failed to create {}", target.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)
        .with_context(|| format!("Failed to compress {}", source.display()))?;
    encoder
        .finish()
        .with_context(|| format!("Failed to finish Gzip encoding for {}", target.display()))?;

    fs::remove_file(source)
        .with_context(|| format!("Failed to remove uncompressed {}", source.display()))?;
    Ok(target)
}

/// Decompresses a `.gz` file into a temporary file that is removed on drop.
pub fn gunzip_to_temp(source: &Path) -> Result<NamedTempFile> {
    let input = File::open(source)
        .with_context(|| format!("Failed to open {}", source.display()))?;
    let mut decoder = GzDecoder::new(input);
    let mut temp = NamedTempFile::new().context("Failed to create temporary file for gunzip")?;
    io::copy(&mut decoder, temp.as_file_mut())
        .with_context(|| format!("Failed to decompress {}", source.display()))?;
    Ok(temp)
}

pub fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name_uses_forward_slashes() -> anyhow::Result<()> {
        let root = Path::new("/data/x");
        assert_eq!(entry_name(root, &root.join("a").join("b.txt"))?, "a/b.txt");
        assert!(entry_name(root, root).is_err());
        assert!(entry_name(root, Path::new("/elsewhere/c.txt")).is_err());
        Ok(())
    }

    #[test]
    fn test_written_archive_extracts() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("note.txt");
        fs::write(&source, b"hello archive")?;

        let archive_path = dir.path().join("out").join("files_full_1.zip");
        let mut writer = ZipArchiveWriter::create(&archive_path, true)?;
        writer.append_file(&source, "nested/note.txt", SystemTime::now(), 13)?;
        let size = writer.finish()?;
        assert!(size > 0);

        let target = dir.path().join("restored");
        assert_eq!(extract_zip_archive(&archive_path, &target)?, 1);
        assert_eq!(fs::read(target.join("nested").join("note.txt"))?, b"hello archive");
        Ok(())
    }

    #[test]
    fn test_missing_source_does_not_leave_an_entry() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let archive_path = dir.path().join("a.zip");
        let mut writer = ZipArchiveWriter::create(&archive_path, false)?;
        assert!(writer
            .append_file(&dir.path().join("gone.txt"), "gone.txt", SystemTime::now(), 0)
            .is_err());
        writer.finish()?;

        let archive = ZipArchive::new(File::open(&archive_path)?)?;
        assert_eq!(archive.len(), 0);
        Ok(())
    }

    #[test]
    fn test_gzip_then_gunzip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dump = dir.path().join("database_full_1.sql");
        fs::write(&dump, b"INSERT INTO users VALUES (1);\n")?;

        let gz = gzip_file(&dump)?;
        assert!(is_gzip(&gz));
        assert!(!dump.exists());

        let plain = gunzip_to_temp(&gz)?;
        assert_eq!(fs::read_to_string(plain.path())?, "INSERT INTO users VALUES (1);\n");
        Ok(())
    }
}
