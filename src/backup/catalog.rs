// mailbackup/src/backup/catalog.rs
use anyhow::{Context, Result};
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use std::str::FromStr;

use super::db_dump::TimestampColumns;
use crate::config::{DatabaseSettings, redact_url};
use crate::utils::{quote_identifier, validate_identifier};

/// Read-only schema introspection the database producer needs before and
/// after a dump.
#[allow(async_fn_in_trait)]
pub trait Catalog {
    async fn list_tables(&self) -> Result<Vec<String>>;
    async fn count_tables(&self) -> Result<u32>;
    /// Which of `created_at` / `updated_at` the table has.
    async fn timestamp_columns(&self, table: &str) -> Result<TimestampColumns>;
    async fn count_rows(&self, table: &str) -> Result<u64>;
}

pub struct MySqlCatalog {
    pool: MySqlPool,
    database: String,
}

impl MySqlCatalog {
    /// Builds a lazily connecting pool; nothing touches the network until
    /// the first query.
    pub fn connect_lazy(settings: &DatabaseSettings) -> Result<Self> {
        let mut options = MySqlConnectOptions::from_str(&settings.url).with_context(|| {
            format!("Invalid MySQL connection URL: {}", redact_url(&settings.url))
        })?;
        if let Some(user) = &settings.username {
            options = options.username(user);
        }
        if let Some(password) = &settings.password {
            options = options.password(password);
        }
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect_lazy_with(options);
        Ok(MySqlCatalog {
            pool,
            database: settings.database_name.clone(),
        })
    }
}

impl Catalog for MySqlCatalog {
    async fn list_tables(&self) -> Result<Vec<String>> {
        // SHOW TABLES may report names as binary strings depending on the server
        let raw: Vec<Vec<u8>> =
            sqlx::query_scalar(&format!("SHOW TABLES FROM {}", quote_identifier(&self.database)))
                .fetch_all(&self.pool)
                .await
                .with_context(|| format!("Failed to list tables of database {}", self.database))?;

        let mut tables = Vec::with_capacity(raw.len());
        for bytes in raw {
            let name = String::from_utf8_lossy(&bytes).into_owned();
            if validate_identifier(&name).is_ok() {
                tables.push(name);
            } else {
                tracing::warn!(table = %name, "Skipping table with unsupported name");
            }
        }
        Ok(tables)
    }

    async fn count_tables(&self) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = ?",
        )
        .bind(&self.database)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to count tables of database {}", self.database))?;
        Ok(count.max(0) as u32)
    }

    async fn timestamp_columns(&self, table: &str) -> Result<TimestampColumns> {
        let names: Vec<Vec<u8>> = sqlx::query_scalar(
            "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
             AND COLUMN_NAME IN ('created_at', 'updated_at')",
        )
        .bind(&self.database)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to look up timestamp columns of {}", table))?;

        let mut columns = TimestampColumns::default();
        // column names compare case-insensitively in MySQL
        for name in &names {
            if name.eq_ignore_ascii_case(b"created_at") {
                columns.created_at = true;
            } else if name.eq_ignore_ascii_case(b"updated_at") {
                columns.updated_at = true;
            }
        }
        Ok(columns)
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        validate_identifier(table)?;
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {}.{}",
            quote_identifier(&self.database),
            quote_identifier(table)
        ))
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to count rows of {}", table))?;
        Ok(count.max(0) as u64)
    }
}
