// mailbackup/src/backup/db_dump.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use super::catalog::Catalog;
use crate::config::DatabaseSettings;
use crate::model::{BackupRecord, BackupScope, BackupTask};
use crate::utils::format::format_size;
use crate::utils::process::run_with_timeout;
use crate::utils::{find_executable, validate_identifier};

const MYSQLDUMP: &str = "mysqldump";

/// Timestamp columns present on a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampColumns {
    pub created_at: bool,
    pub updated_at: bool,
}

impl TimestampColumns {
    pub fn any(&self) -> bool {
        self.created_at || self.updated_at
    }
}

/// `--where` condition selecting rows touched after a reference time.
///
/// Built only from the timestamp and a fixed set of column names, so no
/// caller-supplied text reaches the dump command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    since: DateTime<Utc>,
    columns: TimestampColumns,
}

impl RowFilter {
    pub fn on_columns(since: DateTime<Utc>, columns: TimestampColumns) -> Self {
        RowFilter { since, columns }
    }

    /// `created_at`/`updated_at` are DATETIME columns holding the mail
    /// server's local wall time, which `--tz-utc` does not convert, so the
    /// literal is rendered in the host's local zone.
    pub fn where_clause(&self) -> String {
        let ts = self.since.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
        let mut parts = Vec::with_capacity(2);
        if self.columns.created_at {
            parts.push(format!("created_at > '{}'", ts));
        }
        if self.columns.updated_at {
            parts.push(format!("updated_at > '{}'", ts));
        }
        parts.join(" OR ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpTarget {
    AllDatabases,
    Database(String),
    Tables { database: String, tables: Vec<String> },
}

/// One mysqldump process. A plan of several invocations appends to the
/// same output file in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpInvocation {
    pub target: DumpTarget,
    pub row_filter: Option<RowFilter>,
    /// Routines and events belong to the database, not to a table; only the
    /// first invocation of a plan dumps them.
    pub schema_objects: bool,
}

impl DumpInvocation {
    fn whole(target: DumpTarget) -> Self {
        DumpInvocation {
            target,
            row_filter: None,
            schema_objects: true,
        }
    }

    /// Command-line arguments, without the password (passed via `MYSQL_PWD`).
    pub fn args(&self, settings: &DatabaseSettings) -> Vec<String> {
        let mut args = vec!["--single-transaction".to_string()];
        if self.schema_objects {
            args.push("--routines".to_string());
        }
        args.push("--triggers".to_string());
        if self.schema_objects {
            args.push("--events".to_string());
        }
        args.push("--hex-blob".to_string());
        args.push("--complete-insert".to_string());

        args.push(format!("--host={}", settings.host));
        args.push(format!("--port={}", settings.port));
        if let Some(user) = &settings.username {
            args.push(format!("--user={}", user));
        }
        if let Some(filter) = &self.row_filter {
            args.push(format!("--where={}", filter.where_clause()));
        }

        match &self.target {
            DumpTarget::AllDatabases => args.push("--all-databases".to_string()),
            DumpTarget::Database(name) => args.push(name.clone()),
            DumpTarget::Tables { database, tables } => {
                args.push(database.clone());
                args.extend(tables.iter().cloned());
            }
        }
        args
    }
}

/// Dumps the mail database with mysqldump and records schema statistics.
pub struct DatabaseBackupProducer<C> {
    settings: DatabaseSettings,
    catalog: C,
}

impl<C: Catalog> DatabaseBackupProducer<C> {
    pub fn new(settings: DatabaseSettings, catalog: C) -> Self {
        DatabaseBackupProducer { settings, catalog }
    }

    /// Decides which mysqldump invocations a run needs.
    ///
    /// SYSTEM dumps every database and ignores the row filter. CUSTOM with a
    /// reference time filters only tables that have timestamp columns; those
    /// without are dumped whole first, then one filtered invocation follows
    /// per distinct column set. Every other scope dumps the configured
    /// database whole.
    pub async fn plan(
        &self,
        task: &BackupTask,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<DumpInvocation>> {
        let database = self.settings.database_name.clone();
        validate_identifier(&database)?;

        let since = match (task.backup_scope, since) {
            (BackupScope::System, _) => return Ok(vec![DumpInvocation::whole(DumpTarget::AllDatabases)]),
            (BackupScope::Custom, Some(since)) => since,
            _ => return Ok(vec![DumpInvocation::whole(DumpTarget::Database(database))]),
        };

        let mut unfiltered = Vec::new();
        let mut filtered: BTreeMap<TimestampColumns, Vec<String>> = BTreeMap::new();
        for table in self.catalog.list_tables().await? {
            let columns = self.catalog.timestamp_columns(&table).await?;
            if columns.any() {
                filtered.entry(columns).or_default().push(table);
            } else {
                unfiltered.push(table);
            }
        }

        if filtered.is_empty() {
            return Ok(vec![DumpInvocation::whole(DumpTarget::Database(database))]);
        }

        let mut plan = Vec::with_capacity(filtered.len() + 1);
        if !unfiltered.is_empty() {
            plan.push(DumpInvocation::whole(DumpTarget::Tables {
                database: database.clone(),
                tables: unfiltered,
            }));
        }
        for (columns, tables) in filtered {
            plan.push(DumpInvocation {
                target: DumpTarget::Tables {
                    database: database.clone(),
                    tables,
                },
                row_filter: Some(RowFilter::on_columns(since, columns)),
                schema_objects: plan.is_empty(),
            });
        }
        Ok(plan)
    }

    /// Writes `database_<mode>_<timestamp>.sql` into the record's work
    /// directory. A non-zero exit or timeout of any invocation fails the run.
    pub async fn execute(&self, task: &BackupTask, record: &mut BackupRecord) -> Result<PathBuf> {
        let mysqldump = find_executable(self.settings.bin_path.as_deref(), MYSQLDUMP)?;
        tracing::debug!(path = %mysqldump.display(), "Found mysqldump executable");

        fs::create_dir_all(&record.work_dir).with_context(|| {
            format!("Failed to create work directory {}", record.work_dir.display())
        })?;
        let dump_path = record.work_dir.join(format!(
            "database_{}_{}.sql",
            record.mode.label(),
            Local::now().format("%Y%m%d_%H%M%S")
        ));

        let plan = self.plan(task, record.mode.since()).await?;
        tracing::info!(
            task = %task.name,
            dump = %dump_path.display(),
            invocations = plan.len(),
            "Starting database dump"
        );

        for (i, invocation) in plan.iter().enumerate() {
            let output = if i == 0 {
                File::create(&dump_path)
            } else {
                OpenOptions::new().append(true).open(&dump_path)
            }
            .with_context(|| format!("Failed to open dump file {}", dump_path.display()))?;

            let args = invocation.args(&self.settings);
            tracing::info!(command = %format!("{} {}", MYSQLDUMP, args.join(" ")), "Running dump");

            let mut command = Command::new(&mysqldump);
            command.args(&args).stdin(Stdio::null()).stdout(Stdio::from(output));
            if let Some(password) = &self.settings.password {
                command.env("MYSQL_PWD", password);
            }
            run_with_timeout(command, self.settings.dump_timeout)
                .await
                .with_context(|| format!("Database dump for task '{}' failed", task.name))?;
        }

        let size = fs::metadata(&dump_path)
            .with_context(|| format!("Failed to stat dump file {}", dump_path.display()))?
            .len();
        record.backup_path = Some(dump_path.clone());
        record.backup_size = size;

        self.collect_statistics(record).await;
        tracing::info!(
            task = %task.name,
            size = %format_size(size),
            tables = record.database_tables,
            rows = record.database_records,
            "Database dump completed"
        );
        Ok(dump_path)
    }

    /// Table count and total row count. Statistics never fail a dump that
    /// already succeeded; each failed query is logged and skipped.
    pub async fn collect_statistics(&self, record: &mut BackupRecord) {
        match self.catalog.count_tables().await {
            Ok(count) => record.database_tables = count,
            Err(e) => tracing::warn!(error = %format!("{:#}", e), "Could not count tables"),
        }

        let tables = match self.catalog.list_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "Could not list tables for row counts");
                return;
            }
        };
        let mut total = 0u64;
        for table in &tables {
            match self.catalog.count_rows(table).await {
                Ok(rows) => total += rows,
                Err(e) => {
                    tracing::warn!(table = %table, error = %format!("{:#}", e), "Could not count rows");
                }
            }
        }
        record.database_records = total;
    }
}
