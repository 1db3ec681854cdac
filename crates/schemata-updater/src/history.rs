//! Recorded schema versions.
//!
//! This module manages the `schema_version` table that stores, per
//! component, the version of the last Updates unit that completed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemata_core::value::quote_identifier;
use schemata_core::{ErrorCode, ErrorKind, MigrationFactory, SchemaVersion, SqlValue};

use crate::error::{Result, StoreError};
use crate::store::SchemaStore;

/// Logical name of the version table; the factory's prefix applies.
pub const VERSION_TABLE: &str = "schema_version";

/// A recorded component version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedVersion {
    /// Component name.
    pub component: String,
    /// Version of the last completed unit.
    pub version: SchemaVersion,
    /// When it was recorded.
    pub applied_at: DateTime<Utc>,
}

/// Reads and writes the applied version of each component.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Prepares storage for recording versions.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Returns the recorded version of `component`, `None` if never updated.
    async fn applied_version(&self, component: &str) -> Result<Option<SchemaVersion>>;

    /// Records `version` as the applied version of `component`.
    async fn set_applied_version(&self, component: &str, version: &SchemaVersion) -> Result<()>;

    /// Returns all recorded versions, ordered by component.
    async fn applied_versions(&self) -> Result<Vec<AppliedVersion>>;
}

/// Stores versions in a table reached through a [`SchemaStore`].
#[derive(Debug, Clone)]
pub struct TableVersionStore<S> {
    store: S,
    table: String,
    missing_table: ErrorCode,
}

impl<S: SchemaStore> TableVersionStore<S> {
    /// Creates a version store whose table name is resolved by `factory`.
    pub fn new(store: S, factory: &MigrationFactory) -> Self {
        Self {
            store,
            table: factory.prefix_table(VERSION_TABLE),
            missing_table: factory.error_codes().code(ErrorKind::TableNotExists),
        }
    }

    /// Returns the storage name of the version table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the statement that creates the version table.
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             `component` VARCHAR(255) NOT NULL, \
             `version` VARCHAR(64) NOT NULL, \
             `applied_at` DATETIME NOT NULL, \
             PRIMARY KEY (`component`)) ENGINE=InnoDB DEFAULT CHARSET=utf8",
            quote_identifier(&self.table)
        )
    }

    /// Ensures the version table exists.
    pub async fn ensure_table(&self) -> Result<()> {
        self.store.execute(&self.create_table_sql(), &[]).await?;
        Ok(())
    }

    fn is_missing_table(&self, error: &StoreError) -> bool {
        error
            .code()
            .is_some_and(|code| code == self.missing_table)
    }
}

fn parse_applied_at(value: Option<&SqlValue>) -> DateTime<Utc> {
    let text = value.map(ToString::to_string).unwrap_or_default();
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
                .map(|dt| dt.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}

#[async_trait]
impl<S: SchemaStore> VersionStore for TableVersionStore<S> {
    async fn init(&self) -> Result<()> {
        self.ensure_table().await
    }

    async fn applied_version(&self, component: &str) -> Result<Option<SchemaVersion>> {
        let statement = format!(
            "SELECT `version` FROM {} WHERE `component` = ?",
            quote_identifier(&self.table)
        );
        let rows = match self
            .store
            .fetch_all(&statement, &[SqlValue::from(component)])
            .await
        {
            Ok(rows) => rows,
            // Nothing has been recorded before the table exists.
            Err(e) if self.is_missing_table(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match rows.first().and_then(|row| row.get("version")) {
            Some(version) => Ok(Some(SchemaVersion::parse(&version.to_string())?)),
            None => Ok(None),
        }
    }

    async fn set_applied_version(&self, component: &str, version: &SchemaVersion) -> Result<()> {
        let statement = format!(
            "REPLACE INTO {} (`component`, `version`, `applied_at`) VALUES (?, ?, ?)",
            quote_identifier(&self.table)
        );
        let applied_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.store
            .execute(
                &statement,
                &[
                    SqlValue::from(component),
                    SqlValue::from(version.as_str()),
                    SqlValue::from(applied_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn applied_versions(&self) -> Result<Vec<AppliedVersion>> {
        let statement = format!(
            "SELECT `component`, `version`, `applied_at` FROM {} ORDER BY `component`",
            quote_identifier(&self.table)
        );
        let rows = match self.store.fetch_all(&statement, &[]).await {
            Ok(rows) => rows,
            Err(e) if self.is_missing_table(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::with_capacity(rows.len());
        for row in rows {
            let component = row
                .get("component")
                .map(ToString::to_string)
                .unwrap_or_default();
            let version = row
                .get("version")
                .map(ToString::to_string)
                .unwrap_or_default();
            versions.push(AppliedVersion {
                component,
                version: SchemaVersion::parse(&version)?,
                applied_at: parse_applied_at(row.get("applied_at")),
            });
        }
        Ok(versions)
    }
}
