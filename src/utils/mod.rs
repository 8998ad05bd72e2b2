pub mod checksum;
pub mod format;
pub mod process;

use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use which::which;

use crate::errors::BackupError;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_$-]+$").expect("static regex"));

/// Rejects database/table names that could not be passed safely to SQL text
/// or to the dump command line. A leading `-` would read as an option.
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) && !name.starts_with('-') {
        Ok(())
    } else {
        Err(BackupError::InvalidIdentifier(name.to_string()).into())
    }
}

/// Backtick-quotes an identifier that already passed `validate_identifier`.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Finds a MySQL client tool, preferring the configured bin directory.
pub fn find_executable(bin_path: Option<&Path>, name: &str) -> Result<PathBuf> {
    match bin_path {
        Some(dir) => {
            let candidate = dir.join(name);
            if candidate.is_file() {
                Ok(candidate)
            } else {
                Err(anyhow::anyhow!(
                    "{} not found in configured bin_path {}",
                    name,
                    dir.display()
                ))
            }
        }
        None => which(name).with_context(|| {
            format!(
                "{} executable not found in PATH. Please ensure MySQL client tools are installed and in your PATH.",
                name
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("secure_email_system").is_ok());
        assert!(validate_identifier("mail-2024$archive").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("mail; DROP TABLE users").is_err());
        assert!(validate_identifier("users`").is_err());
        assert!(validate_identifier("--all-databases").is_err());
    }

    #[test]
    fn test_find_executable_in_configured_dir() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(find_executable(Some(dir.path()), "mysqldump").is_err());

        std::fs::write(dir.path().join("mysqldump"), b"")?;
        assert_eq!(
            find_executable(Some(dir.path()), "mysqldump")?,
            dir.path().join("mysqldump")
        );
        Ok(())
    }
}
