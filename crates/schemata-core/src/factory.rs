//! Builds typed migrations from structured parameters.
//!
//! Every table-accepting constructor resolves the logical table name through
//! the injected [`TablePrefixer`] exactly once. Inputs are not validated: a
//! malformed definition yields a migration the store will reject.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error_code::{ErrorCodes, ErrorKind, IgnoredErrors};
use crate::migration::{
    AddColumn, AddIndex, BatchInsert, BoundSql, ChangeColumnType, ChangeColumnTypes, CreateTable,
    DropTable, Insert, Migration, Sql,
};
use crate::prefix::{TablePrefix, TablePrefixer};
use crate::value::SqlValue;

/// Storage settings applied to created tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbSettings {
    /// Storage engine, e.g. `InnoDB`.
    pub engine: String,
    /// Default table charset.
    pub charset: String,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            engine: String::from("InnoDB"),
            charset: String::from("utf8"),
        }
    }
}

/// One or more column expressions for [`MigrationFactory::add_index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumns(Vec<String>);

impl From<&str> for IndexColumns {
    fn from(column: &str) -> Self {
        Self(vec![column.to_string()])
    }
}

impl From<String> for IndexColumns {
    fn from(column: String) -> Self {
        Self(vec![column])
    }
}

impl From<Vec<String>> for IndexColumns {
    fn from(columns: Vec<String>) -> Self {
        Self(columns)
    }
}

impl<const N: usize> From<[&str; N]> for IndexColumns {
    fn from(columns: [&str; N]) -> Self {
        Self(columns.iter().map(|c| (*c).to_string()).collect())
    }
}

impl From<&[&str]> for IndexColumns {
    fn from(columns: &[&str]) -> Self {
        Self(columns.iter().map(|c| (*c).to_string()).collect())
    }
}

/// Creates migrations.
#[derive(Clone)]
pub struct MigrationFactory {
    settings: DbSettings,
    prefixer: Arc<dyn TablePrefixer>,
    codes: ErrorCodes,
}

impl MigrationFactory {
    /// Creates a factory from explicit collaborators.
    pub fn new(
        settings: DbSettings,
        prefixer: impl TablePrefixer + 'static,
        codes: ErrorCodes,
    ) -> Self {
        Self {
            settings,
            prefixer: Arc::new(prefixer),
            codes,
        }
    }

    /// Creates a factory with a string prefix, default settings and MySQL codes.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::new(
            DbSettings::default(),
            TablePrefix::new(prefix),
            ErrorCodes::mysql(),
        )
    }

    /// Returns the storage settings.
    #[must_use]
    pub fn settings(&self) -> &DbSettings {
        &self.settings
    }

    /// Returns the error-code table.
    #[must_use]
    pub fn error_codes(&self) -> &ErrorCodes {
        &self.codes
    }

    /// Resolves a logical table name to its storage name.
    #[must_use]
    pub fn prefix_table(&self, table: &str) -> String {
        self.prefixer.prefix_table(table)
    }

    /// A custom statement. Table names inside it must already be prefixed.
    pub fn sql(&self, statement: impl Into<String>, ignore: impl Into<IgnoredErrors>) -> Migration {
        Migration::RawSql(Sql::new(statement.into(), ignore.into()))
    }

    /// A custom statement with `?` placeholders bound to `binds` in order.
    pub fn bound_sql(
        &self,
        statement: impl Into<String>,
        binds: Vec<SqlValue>,
        ignore: impl Into<IgnoredErrors>,
    ) -> Migration {
        Migration::BoundSql(BoundSql::new(statement.into(), binds, ignore.into()))
    }

    /// Creates a table from `(column, type definition)` pairs.
    pub fn create_table<C, T>(&self, table: &str, columns: impl IntoIterator<Item = (C, T)>) -> Migration
    where
        C: Into<String>,
        T: Into<String>,
    {
        Migration::CreateTable(CreateTable::new(
            self.prefix_table(table),
            columns.into_iter().map(|(c, t)| (c.into(), t.into())).collect(),
            self.settings.engine.clone(),
            self.settings.charset.clone(),
            self.codes.resolve(&[ErrorKind::TableExists]),
        ))
    }

    /// Drops a table.
    #[must_use]
    pub fn drop_table(&self, table: &str) -> Migration {
        Migration::DropTable(DropTable::new(
            self.prefix_table(table),
            self.codes
                .resolve(&[ErrorKind::TableNotExists, ErrorKind::UnknownTable]),
        ))
    }

    /// Adds a column, after `after` if given, at the end otherwise.
    #[must_use]
    pub fn add_column(
        &self,
        table: &str,
        column: &str,
        column_type: &str,
        after: Option<&str>,
    ) -> Migration {
        Migration::AddColumn(AddColumn::new(
            self.prefix_table(table),
            column.to_string(),
            column_type.to_string(),
            after.map(str::to_string),
            self.codes.resolve(&[ErrorKind::DuplicateColumn]),
        ))
    }

    /// Changes the type of one column.
    #[must_use]
    pub fn change_column_type(&self, table: &str, column: &str, column_type: &str) -> Migration {
        Migration::ChangeColumnType(ChangeColumnType::new(
            self.prefix_table(table),
            column.to_string(),
            column_type.to_string(),
            self.codes.resolve(&[ErrorKind::DuplicateColumn]),
        ))
    }

    /// Changes the types of several columns in one statement.
    pub fn change_column_types<C, T>(
        &self,
        table: &str,
        columns: impl IntoIterator<Item = (C, T)>,
    ) -> Migration
    where
        C: Into<String>,
        T: Into<String>,
    {
        Migration::ChangeColumnTypes(ChangeColumnTypes::new(
            self.prefix_table(table),
            columns.into_iter().map(|(c, t)| (c.into(), t.into())).collect(),
            self.codes.resolve(&[ErrorKind::DuplicateColumn]),
        ))
    }

    /// Adds a plain index over one column or an ordered list of columns.
    pub fn add_index(&self, table: &str, columns: impl Into<IndexColumns>) -> Migration {
        Migration::AddIndex(AddIndex::new(
            self.prefix_table(table),
            columns.into().0,
            self.codes
                .resolve(&[ErrorKind::DuplicateKey, ErrorKind::KeyColumnNotExists]),
        ))
    }

    /// Inserts one row from `(column, value)` pairs.
    pub fn insert<C, V>(&self, table: &str, values: impl IntoIterator<Item = (C, V)>) -> Migration
    where
        C: Into<String>,
        V: Into<SqlValue>,
    {
        Migration::Insert(Insert::new(
            self.prefix_table(table),
            values.into_iter().map(|(c, v)| (c.into(), v.into())).collect(),
            self.codes.resolve(&[ErrorKind::DuplicateEntry]),
        ))
    }

    /// Inserts many rows, in bulk when possible.
    ///
    /// With `surface_bulk_errors` false a failed bulk load silently degrades
    /// to row-by-row inserts.
    pub fn batch_insert<C: Into<String>>(
        &self,
        table: &str,
        column_names: impl IntoIterator<Item = C>,
        rows: Vec<Vec<SqlValue>>,
        surface_bulk_errors: bool,
        charset: Option<&str>,
    ) -> Migration {
        Migration::BatchInsert(BatchInsert::new(
            self.prefix_table(table),
            column_names.into_iter().map(Into::into).collect(),
            rows,
            surface_bulk_errors,
            charset.unwrap_or("utf8").to_string(),
        ))
    }
}

impl std::fmt::Debug for MigrationFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationFactory")
            .field("settings", &self.settings)
            .field("codes", &self.codes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_code::ErrorCode;

    const TABLE: &str = "tablename";
    const PREFIXED: &str = "prefix_tablename";

    fn factory() -> MigrationFactory {
        MigrationFactory::with_prefix("prefix_")
    }

    fn codes(m: &Migration) -> Vec<u16> {
        m.ignorable_errors().iter().map(ErrorCode::get).collect()
    }

    #[test]
    fn test_sql_forwards_query_and_error_code() {
        let m = factory().sql("SELECT 1", 5u16);
        assert!(matches!(m, Migration::RawSql(_)));
        assert_eq!(m.render(), "SELECT 1");
        assert_eq!(codes(&m), vec![5]);
    }

    #[test]
    fn test_sql_without_ignored_codes() {
        let m = factory().sql("SELECT 1", IgnoredErrors::none());
        assert!(m.ignorable_errors().is_empty());
    }

    #[test]
    fn test_bound_sql_forwards_parameters() {
        let m = factory().bound_sql("SELECT 2 WHERE ?", vec![SqlValue::from("query")], [8u16]);
        assert!(matches!(m, Migration::BoundSql(_)));
        assert_eq!(m.render(), "SELECT 2 WHERE ?");
        assert_eq!(m.to_string(), "SELECT 2 WHERE 'query';");
        assert_eq!(codes(&m), vec![8]);
    }

    #[test]
    fn test_create_table_forwards_parameters() {
        let m = factory().create_table(TABLE, [("c1", "ty1"), ("c2", "ty2")]);
        assert!(matches!(m, Migration::CreateTable(_)));
        assert_eq!(
            m.render(),
            "CREATE TABLE `prefix_tablename` (`c1` ty1, `c2` ty2) ENGINE=InnoDB DEFAULT CHARSET=utf8"
        );
        assert_eq!(codes(&m), vec![1050]);
    }

    #[test]
    fn test_create_table_uses_configured_engine() {
        let settings = DbSettings {
            engine: "MyISAM".into(),
            ..DbSettings::default()
        };
        let f = MigrationFactory::new(settings, TablePrefix::new("p_"), ErrorCodes::mysql());
        let m = f.create_table("t", [("column", "INT(10) DEFAULT 0"), ("column2", "VARCHAR(255)")]);
        assert_eq!(
            m.render(),
            "CREATE TABLE `p_t` (`column` INT(10) DEFAULT 0, `column2` VARCHAR(255)) ENGINE=MyISAM DEFAULT CHARSET=utf8"
        );
    }

    #[test]
    fn test_drop_table_forwards_parameters() {
        let m = factory().drop_table(TABLE);
        assert!(matches!(m, Migration::DropTable(_)));
        assert_eq!(m.render(), "DROP TABLE `prefix_tablename`");
        assert_eq!(codes(&m), vec![1051, 1146]);
    }

    #[test]
    fn test_add_column_with_last_column() {
        let m = factory().add_column(TABLE, "c", "INT(10) DEFAULT 0", Some("last"));
        assert!(matches!(m, Migration::AddColumn(_)));
        assert_eq!(
            m.render(),
            "ALTER TABLE `prefix_tablename` ADD COLUMN `c` INT(10) DEFAULT 0 AFTER `last`"
        );
        assert_eq!(codes(&m), vec![1060]);
    }

    #[test]
    fn test_change_column_type_forwards_parameters() {
        let m = factory().change_column_type(TABLE, "column", "INT(10) DEFAULT 0");
        assert_eq!(
            m.render(),
            "ALTER TABLE `prefix_tablename` CHANGE `column` `column` INT(10) DEFAULT 0"
        );
        assert_eq!(codes(&m), vec![1060]);
    }

    #[test]
    fn test_change_column_types_forwards_parameters() {
        let m = factory().change_column_types(TABLE, vec![("a", "INT(10)"), ("b", "TEXT")]);
        assert!(matches!(m, Migration::ChangeColumnTypes(_)));
        assert_eq!(
            m.render(),
            "ALTER TABLE `prefix_tablename` CHANGE `a` `a` INT(10), CHANGE `b` `b` TEXT"
        );
    }

    #[test]
    fn test_add_index_with_length_qualifier() {
        let m = factory().add_index(TABLE, ["c1", "c3(10)"]);
        assert!(matches!(m, Migration::AddIndex(_)));
        assert_eq!(
            m.render(),
            "ALTER TABLE `prefix_tablename` ADD INDEX(`c1`, `c3(10)`)"
        );
        assert_eq!(codes(&m), vec![1061, 1072]);
    }

    #[test]
    fn test_add_index_single_column() {
        let m = factory().add_index(TABLE, "c1");
        assert_eq!(m.render(), "ALTER TABLE `prefix_tablename` ADD INDEX(`c1`)");
    }

    #[test]
    fn test_insert_forwards_parameters() {
        let m = factory().insert(
            TABLE,
            vec![("column1", SqlValue::from("val1")), ("column3", SqlValue::Int(5))],
        );
        assert!(matches!(m, Migration::Insert(_)));
        assert_eq!(
            m.render(),
            "INSERT INTO `prefix_tablename` (`column1`, `column3`) VALUES ('val1',5)"
        );
        assert_eq!(codes(&m), vec![1062]);
    }

    #[test]
    fn test_batch_insert_forwards_parameters() {
        let m = factory().batch_insert(
            TABLE,
            ["col1"],
            vec![vec![SqlValue::from("val1")]],
            true,
            Some("utf8"),
        );
        assert_eq!(m.to_string(), "<batch insert>");
        let Migration::BatchInsert(batch) = m else {
            panic!("expected a batch insert");
        };
        assert_eq!(batch.table(), PREFIXED);
        assert_eq!(batch.column_names(), ["col1".to_string()]);
        assert_eq!(batch.rows(), [vec![SqlValue::from("val1")]]);
        assert_eq!(batch.charset(), "utf8");
        assert!(batch.surfaces_bulk_errors());
    }

    #[test]
    fn test_prefix_applied_once_per_call() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let prefixer = |table: &str| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            format!("x_{table}")
        };
        let f = MigrationFactory::new(DbSettings::default(), prefixer, ErrorCodes::mysql());

        let m = f.add_column("t", "c", "INT", None);
        assert_eq!(m.table(), Some("x_t"));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remapped_error_codes() {
        let codes_table = ErrorCodes {
            table_exists: ErrorCode(7),
            ..ErrorCodes::mysql()
        };
        let f = MigrationFactory::new(DbSettings::default(), TablePrefix::default(), codes_table);
        let m = f.create_table("t", [("a", "INT")]);
        assert!(m.is_ignorable(ErrorCode(7)));
        assert!(!m.is_ignorable(ErrorCode(1050)));
    }
}
