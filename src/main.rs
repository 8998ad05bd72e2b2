//! Mail system backup tool
//!
//! Runs backup tasks from config.json and restores, verifies or expires
//! the backups they produced.

// mailbackup/src/main.rs
mod backup;
mod config;
mod errors;
mod model;
mod restore;
mod storage;
mod utils;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use config::AppConfig;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use storage::StorageService;
use utils::format::{format_duration, format_size};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_logging();

    match run_app().await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_app() -> Result<()> {
    let config_path = PathBuf::from("config.json");
    let app_config = AppConfig::load_from_json(&config_path).with_context(|| {
        format!(
            "Failed to load application configuration from {}",
            config_path.display()
        )
    })?;

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };
    let arg = |i: usize, label: &str| -> Result<String> {
        match args.get(i) {
            Some(value) => Ok(value.trim().to_string()),
            None => prompt_line(label),
        }
    };

    match choice.as_str() {
        "1" | "backup" => {
            let task_name = arg(2, "Task name")?;
            let reference = match args.get(3) {
                Some(raw) => Some(parse_reference(raw)?),
                None => None,
            };
            println!("🚀 Starting backup of task '{}'...", task_name);
            let records = backup::run_backup_flow(&app_config, &task_name, reference)
                .await
                .context("Backup process failed")?;
            for record in &records {
                println!(
                    "  {} {:?}: {} in {} ({} files processed, {} skipped, {} failed) -> {}",
                    record.kind.as_str(),
                    record.status,
                    format_size(record.compressed_size.unwrap_or(record.backup_size)),
                    format_duration(record.duration_secs.unwrap_or(0)),
                    record.files_processed,
                    record.files_skipped,
                    record.files_failed,
                    record.storage_location.as_deref().unwrap_or("-")
                );
            }
        }
        "2" | "restore" => {
            let manifest = PathBuf::from(arg(2, "Manifest path")?);
            let target = args.get(3).map(PathBuf::from);
            println!("🔄 Starting restore from {}...", manifest.display());
            let record = restore::run_restore_flow(&app_config, &manifest, target.as_deref())
                .await
                .context("Restore process failed")?;
            println!("Restored {} (restore #{})", record.backup_name, record.restored_count);
        }
        "3" | "verify" => {
            let manifest = PathBuf::from(arg(2, "Manifest path")?);
            println!("🔍 Verifying {}...", manifest.display());
            let status = restore::run_verify_flow(&manifest).context("Verification failed")?;
            println!("Verification result: {:?}", status);
            if status != model::VerificationStatus::Verified {
                anyhow::bail!("Backup at {} did not verify", manifest.display());
            }
        }
        "4" | "cleanup" => {
            let task_name = arg(2, "Task name")?;
            println!("🧹 Removing expired backups of task '{}'...", task_name);
            let summary = backup::run_cleanup_flow(&app_config, &task_name).await?;
            println!(
                "Examined {} backups, removed {}, {} failed",
                summary.examined, summary.removed, summary.failed
            );
        }
        "5" | "test-storage" => {
            let task_name = arg(2, "Task name")?;
            let task = app_config.find_task(&task_name)?;
            let storage = StorageService::new(app_config.storage.clone());
            if storage.test_connection(task.storage_type, &task.storage_path) {
                println!("✓ {} storage at {} is reachable", task.storage_type, task.storage_path);
            } else {
                anyhow::bail!("{} storage at {} is not reachable", task.storage_type, task.storage_path);
            }
        }
        _ => {
            println!(
                "❌ Invalid choice. Please enter '1' (backup), '2' (restore), '3' (verify), '4' (cleanup) or '5' (test-storage)."
            );
            anyhow::bail!("Invalid operation choice");
        }
    }
    Ok(())
}

fn parse_reference(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Reference time '{}' is not RFC 3339 (e.g. 2024-05-01T00:00:00Z)", raw))
}

/// Prompts user to select an operation
fn prompt_choice() -> Result<String> {
    println!("Select an operation:");
    println!("1. Run a backup task (or type 'backup')");
    println!("2. Restore a backup from its manifest (or type 'restore')");
    println!("3. Verify a backup (or type 'verify')");
    println!("4. Remove expired backups of a task (or type 'cleanup')");
    println!("5. Test a task's storage (or type 'test-storage')");
    prompt_line("Enter your choice")
}

fn prompt_line(label: &str) -> Result<String> {
    use std::io::{Write, stdin, stdout};

    print!("{}: ", label);
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    let input = input.trim().to_string();
    if input.is_empty() {
        anyhow::bail!("{} is required", label);
    }
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference_accepts_offsets() -> anyhow::Result<()> {
        let t = parse_reference("2024-05-01T02:00:00+02:00")?;
        assert_eq!(t, "2024-05-01T00:00:00Z".parse::<DateTime<Utc>>()?);
        assert!(parse_reference("yesterday").is_err());
        Ok(())
    }
}
