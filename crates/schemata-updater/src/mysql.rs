//! MySQL schema store over an sqlx pool.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use schemata_core::value::{quote, quote_identifier};
use schemata_core::{BatchInsert, SqlValue};
use sqlx::mysql::{MySqlDatabaseError, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row as _};
use tracing::debug;

use crate::error::StoreError;
use crate::store::{Row, SchemaStore};

/// Maps an sqlx error to a store error, keeping the MySQL error number.
pub fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) => match db.try_downcast_ref::<MySqlDatabaseError>() {
            Some(mysql) => StoreError::database(mysql.number(), mysql.message()),
            None => StoreError::Connection(error.to_string()),
        },
        _ => StoreError::Connection(error.to_string()),
    }
}

/// A MySQL-backed store.
///
/// Uses a single pooled connection: a migration run owns one session.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    bulk_load_dir: Option<PathBuf>,
}

impl MySqlStore {
    /// Connects to `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: MySqlPool) -> Self {
        Self {
            pool,
            bulk_load_dir: None,
        }
    }

    /// Enables `LOAD DATA INFILE`, staging data files in `directory`.
    ///
    /// The directory must be readable by the MySQL server.
    #[must_use]
    pub fn with_bulk_load_dir(mut self, directory: impl Into<PathBuf>) -> Self {
        self.bulk_load_dir = Some(directory.into());
        self
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn query<'q>(
        statement: &'q str,
        binds: &'q [SqlValue],
    ) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
        let mut query = sqlx::query(statement);
        for value in binds {
            query = match value {
                SqlValue::Null => query.bind(None::<String>),
                SqlValue::Bool(b) => query.bind(*b),
                SqlValue::Int(n) => query.bind(*n),
                SqlValue::Float(f) => query.bind(*f),
                SqlValue::Text(s) => query.bind(s.as_str()),
            };
        }
        query
    }
}

fn decode_value(row: &MySqlRow, index: usize) -> SqlValue {
    use sqlx::ValueRef as _;

    match row.try_get_raw(index) {
        Ok(raw) if !raw.is_null() => {}
        _ => return SqlValue::Null,
    }

    if let Ok(n) = row.try_get::<i64, _>(index) {
        return SqlValue::Int(n);
    }
    if let Ok(n) = row.try_get::<u64, _>(index) {
        return SqlValue::Int(i64::try_from(n).unwrap_or(i64::MAX));
    }
    if let Ok(f) = row.try_get::<f64, _>(index) {
        return SqlValue::Float(f);
    }
    if let Ok(ts) = row.try_get::<chrono::NaiveDateTime, _>(index) {
        return SqlValue::Text(ts.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(date) = row.try_get::<chrono::NaiveDate, _>(index) {
        return SqlValue::Text(date.to_string());
    }
    if let Ok(text) = row.try_get::<String, _>(index) {
        return SqlValue::Text(text);
    }
    // DECIMAL and friends arrive as text on the wire.
    if let Ok(text) = row.try_get_unchecked::<String, _>(index) {
        return SqlValue::Text(text);
    }
    row.try_get_unchecked::<Vec<u8>, _>(index)
        .map_or(SqlValue::Null, |bytes| {
            SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
        })
}

fn decode_row(row: &MySqlRow) -> Row {
    Row::new(
        row.columns()
            .iter()
            .map(|column| {
                (
                    column.name().to_string(),
                    decode_value(row, column.ordinal()),
                )
            })
            .collect(),
    )
}

/// Encodes one field for a tab-separated `LOAD DATA` file.
fn escape_field(value: &SqlValue) -> String {
    let text = match value {
        SqlValue::Null => return String::from("\\N"),
        other => other.to_string(),
    };
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\0' => escaped.push_str("\\0"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn data_file_contents(batch: &BatchInsert) -> String {
    let mut contents = String::new();
    for row in batch.rows() {
        let fields: Vec<String> = row.iter().map(escape_field).collect();
        contents.push_str(&fields.join("\t"));
        contents.push('\n');
    }
    contents
}

fn load_data_statement(path: &Path, batch: &BatchInsert) -> String {
    let columns: Vec<String> = batch
        .column_names()
        .iter()
        .map(|c| quote_identifier(c))
        .collect();
    format!(
        "LOAD DATA INFILE {} INTO TABLE {} CHARACTER SET {} \
         FIELDS TERMINATED BY '\\t' ESCAPED BY '\\\\' LINES TERMINATED BY '\\n' ({})",
        quote(&path.to_string_lossy()),
        quote_identifier(batch.table()),
        batch.charset(),
        columns.join(", ")
    )
}

async fn write_data_file(path: &Path, batch: &BatchInsert) -> Result<(), StoreError> {
    tokio::fs::write(path, data_file_contents(batch))
        .await
        .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))
}

#[async_trait]
impl SchemaStore for MySqlStore {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn execute(&self, statement: &str, binds: &[SqlValue]) -> Result<u64, StoreError> {
        debug!(statement, binds = binds.len(), "Executing statement");
        let result = if binds.is_empty() {
            // Not every DDL statement can be prepared.
            sqlx::raw_sql(statement).execute(&self.pool).await
        } else {
            Self::query(statement, binds).execute(&self.pool).await
        };
        result
            .map(|done| done.rows_affected())
            .map_err(map_sqlx_error)
    }

    async fn fetch_all(
        &self,
        statement: &str,
        binds: &[SqlValue],
    ) -> Result<Vec<Row>, StoreError> {
        debug!(statement, binds = binds.len(), "Fetching rows");
        let rows = Self::query(statement, binds)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.iter().map(decode_row).collect())
    }

    fn supports_bulk_load(&self) -> bool {
        self.bulk_load_dir.is_some()
    }

    async fn bulk_load(&self, batch: &BatchInsert) -> Result<u64, StoreError> {
        let Some(directory) = &self.bulk_load_dir else {
            return Err(StoreError::Unsupported(format!(
                "bulk load into `{}` is not enabled",
                batch.table()
            )));
        };

        let path = directory.join(format!(
            "{}-{}-{}.tsv",
            batch.table(),
            std::process::id(),
            chrono::Utc::now().timestamp_micros()
        ));
        write_data_file(&path, batch).await?;

        let statement = load_data_statement(&path, batch);
        debug!(statement = %statement, rows = batch.rows().len(), "Bulk loading");
        let result = sqlx::raw_sql(&statement)
            .execute(&self.pool)
            .await
            .map(|done| done.rows_affected())
            .map_err(map_sqlx_error);

        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %e, "Could not remove bulk load file");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemata_core::MigrationFactory;

    fn batch() -> BatchInsert {
        let factory = MigrationFactory::with_prefix("p_");
        match factory.batch_insert(
            "log",
            ["name", "note"],
            vec![
                vec![SqlValue::from("a\tb"), SqlValue::Null],
                vec![SqlValue::from("c\\d"), SqlValue::Int(5)],
            ],
            false,
            Some("latin1"),
        ) {
            schemata_core::Migration::BatchInsert(batch) => batch,
            other => panic!("unexpected migration {other:?}"),
        }
    }

    #[test]
    fn test_data_file_escaping() {
        assert_eq!(data_file_contents(&batch()), "a\\tb\t\\N\nc\\\\d\t5\n");
    }

    #[tokio::test]
    async fn test_write_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p_log.tsv");
        write_data_file(&path, &batch()).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            data_file_contents(&batch())
        );

        let missing = dir.path().join("missing").join("p_log.tsv");
        let err = write_data_file(&missing, &batch()).await.unwrap_err();
        assert!(matches!(&err, StoreError::Io(message) if message.contains("missing")));
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_load_data_statement() {
        let statement = load_data_statement(Path::new("/tmp/p_log.tsv"), &batch());
        assert!(statement.starts_with(
            "LOAD DATA INFILE '/tmp/p_log.tsv' INTO TABLE `p_log` CHARACTER SET latin1"
        ));
        assert!(statement.ends_with("(`name`, `note`)"));
    }
}
