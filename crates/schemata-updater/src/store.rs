//! The schema store boundary.
//!
//! The executor talks to a database only through [`SchemaStore`]. A store
//! runs one statement at a time and reports failures with the engine's
//! error code, which is what the ignorable-error sets are keyed to.

use std::sync::Arc;

use async_trait::async_trait;
use schemata_core::{BatchInsert, SqlValue};

use crate::error::StoreError;

/// One result row, columns in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Creates a row from `(column, value)` pairs.
    #[must_use]
    pub fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    /// Returns the value of `column` (case-insensitive, like MySQL).
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// Returns the text of `column`, or `None` if missing or not text.
    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_str)
    }

    /// Returns the column names.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the values in column order.
    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.columns.iter().map(|(_, value)| value)
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A database that migrations can be applied to.
///
/// Implementations must be Send + Sync; a single run uses the store from
/// one task at a time.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Store type identifier for logging.
    fn name(&self) -> &'static str;

    /// Executes one statement, binding `binds` to its `?` placeholders in
    /// order. Returns the number of affected rows.
    async fn execute(&self, statement: &str, binds: &[SqlValue]) -> Result<u64, StoreError>;

    /// Runs a query and returns all rows.
    async fn fetch_all(&self, statement: &str, binds: &[SqlValue])
        -> Result<Vec<Row>, StoreError>;

    /// Whether [`SchemaStore::bulk_load`] may be attempted.
    fn supports_bulk_load(&self) -> bool {
        false
    }

    /// Loads all rows of a batch insert in one operation.
    async fn bulk_load(&self, batch: &BatchInsert) -> Result<u64, StoreError> {
        Err(StoreError::Unsupported(format!(
            "bulk load into `{}` on {}",
            batch.table(),
            self.name()
        )))
    }
}

#[async_trait]
impl<T: SchemaStore + ?Sized> SchemaStore for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn execute(&self, statement: &str, binds: &[SqlValue]) -> Result<u64, StoreError> {
        (**self).execute(statement, binds).await
    }

    async fn fetch_all(
        &self,
        statement: &str,
        binds: &[SqlValue],
    ) -> Result<Vec<Row>, StoreError> {
        (**self).fetch_all(statement, binds).await
    }

    fn supports_bulk_load(&self) -> bool {
        (**self).supports_bulk_load()
    }

    async fn bulk_load(&self, batch: &BatchInsert) -> Result<u64, StoreError> {
        (**self).bulk_load(batch).await
    }
}
