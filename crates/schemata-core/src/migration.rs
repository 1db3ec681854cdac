//! Migration values.
//!
//! A [`Migration`] is one self-describing schema change. Its statement is
//! rendered once, when the value is built, and never changes afterwards;
//! the same goes for the set of error codes it treats as "already done".
//! Migrations hold no connection state and are consumed by an executor.

use std::fmt;

use crate::error_code::{ErrorCode, IgnoredErrors};
use crate::value::{quote_identifier, SqlValue};

/// Statement shown for batch inserts, which are never rendered as one statement.
pub const BATCH_INSERT_PLACEHOLDER: &str = "<batch insert>";

/// A single schema-change unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Migration {
    /// A literal statement.
    RawSql(Sql),
    /// A statement with positional `?` parameters.
    BoundSql(BoundSql),
    /// `CREATE TABLE`.
    CreateTable(CreateTable),
    /// `DROP TABLE`.
    DropTable(DropTable),
    /// `ALTER TABLE ... ADD COLUMN`.
    AddColumn(AddColumn),
    /// `ALTER TABLE ... CHANGE` for one column.
    ChangeColumnType(ChangeColumnType),
    /// `ALTER TABLE ... CHANGE` for several columns.
    ChangeColumnTypes(ChangeColumnTypes),
    /// `ALTER TABLE ... ADD INDEX`.
    AddIndex(AddIndex),
    /// `INSERT INTO` with inline literals.
    Insert(Insert),
    /// Bulk load with row-by-row fallback.
    BatchInsert(BatchInsert),
}

impl Migration {
    /// Returns the rendered statement.
    ///
    /// Pure and repeatable: the string was built at construction time.
    #[must_use]
    pub fn render(&self) -> &str {
        match self {
            Self::RawSql(m) => &m.statement,
            Self::BoundSql(m) => &m.statement,
            Self::CreateTable(m) => &m.statement,
            Self::DropTable(m) => &m.statement,
            Self::AddColumn(m) => &m.statement,
            Self::ChangeColumnType(m) => &m.statement,
            Self::ChangeColumnTypes(m) => &m.statement,
            Self::AddIndex(m) => &m.statement,
            Self::Insert(m) => &m.statement,
            Self::BatchInsert(_) => BATCH_INSERT_PLACEHOLDER,
        }
    }

    /// Returns the error codes this migration treats as success-equivalent.
    #[must_use]
    pub fn ignorable_errors(&self) -> &IgnoredErrors {
        match self {
            Self::RawSql(m) => &m.ignored,
            Self::BoundSql(m) => &m.ignored,
            Self::CreateTable(m) => &m.ignored,
            Self::DropTable(m) => &m.ignored,
            Self::AddColumn(m) => &m.ignored,
            Self::ChangeColumnType(m) => &m.ignored,
            Self::ChangeColumnTypes(m) => &m.ignored,
            Self::AddIndex(m) => &m.ignored,
            Self::Insert(m) => &m.ignored,
            Self::BatchInsert(m) => &m.ignored,
        }
    }

    /// Returns whether a store error with `code` may be ignored.
    #[must_use]
    pub fn is_ignorable(&self, code: ErrorCode) -> bool {
        self.ignorable_errors().contains(code)
    }

    /// Returns the bind values, empty unless this is a bound statement.
    #[must_use]
    pub fn binds(&self) -> &[SqlValue] {
        match self {
            Self::BoundSql(m) => &m.binds,
            _ => &[],
        }
    }

    /// Returns the prefixed table this migration targets, if known.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::RawSql(_) | Self::BoundSql(_) => None,
            Self::CreateTable(m) => Some(&m.table),
            Self::DropTable(m) => Some(&m.table),
            Self::AddColumn(m) => Some(&m.table),
            Self::ChangeColumnType(m) => Some(&m.table),
            Self::ChangeColumnTypes(m) => Some(&m.table),
            Self::AddIndex(m) => Some(&m.table),
            Self::Insert(m) => Some(&m.table),
            Self::BatchInsert(m) => Some(&m.table),
        }
    }

    /// Returns a short name for the variant, used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RawSql(_) => "sql",
            Self::BoundSql(_) => "bound_sql",
            Self::CreateTable(_) => "create_table",
            Self::DropTable(_) => "drop_table",
            Self::AddColumn(_) => "add_column",
            Self::ChangeColumnType(_) => "change_column_type",
            Self::ChangeColumnTypes(_) => "change_column_types",
            Self::AddIndex(_) => "add_index",
            Self::Insert(_) => "insert",
            Self::BatchInsert(_) => "batch_insert",
        }
    }
}

/// Human-facing form: the statement terminated by `;`, with bind values
/// interpolated for bound statements.
impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BoundSql(m) => write!(f, "{};", m.interpolated()),
            Self::BatchInsert(_) => f.write_str(BATCH_INSERT_PLACEHOLDER),
            other => write!(f, "{};", other.render()),
        }
    }
}

/// A literal statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sql {
    statement: String,
    ignored: IgnoredErrors,
}

impl Sql {
    pub(crate) fn new(statement: String, ignored: IgnoredErrors) -> Self {
        Self { statement, ignored }
    }
}

/// A statement with positional parameters.
///
/// The number and order of `binds` must match the `?` placeholders; a
/// mismatch is reported by the store at execution time.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSql {
    statement: String,
    binds: Vec<SqlValue>,
    ignored: IgnoredErrors,
}

impl BoundSql {
    pub(crate) fn new(statement: String, binds: Vec<SqlValue>, ignored: IgnoredErrors) -> Self {
        Self {
            statement,
            binds,
            ignored,
        }
    }

    /// Returns the bind values in placeholder order.
    #[must_use]
    pub fn binds(&self) -> &[SqlValue] {
        &self.binds
    }

    /// Returns the statement with each `?` outside string literals replaced
    /// by the next bind value's literal. For display only.
    #[must_use]
    pub fn interpolated(&self) -> String {
        let mut out = String::with_capacity(self.statement.len());
        let mut binds = self.binds.iter();
        let mut quote: Option<char> = None;
        let mut escaped = false;

        for c in self.statement.chars() {
            match quote {
                Some(q) => {
                    out.push(c);
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == q {
                        quote = None;
                    }
                }
                None if c == '\'' || c == '"' || c == '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                None if c == '?' => match binds.next() {
                    Some(value) => out.push_str(&value.to_literal()),
                    None => out.push(c),
                },
                None => out.push(c),
            }
        }
        out
    }
}

/// `CREATE TABLE` with an ordered column map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    table: String,
    columns: Vec<(String, String)>,
    engine: String,
    charset: String,
    statement: String,
    ignored: IgnoredErrors,
}

impl CreateTable {
    pub(crate) fn new(
        table: String,
        columns: Vec<(String, String)>,
        engine: String,
        charset: String,
        ignored: IgnoredErrors,
    ) -> Self {
        let definitions: Vec<String> = columns
            .iter()
            .map(|(name, column_type)| format!("{} {}", quote_identifier(name), column_type))
            .collect();
        let statement = format!(
            "CREATE TABLE {} ({}) ENGINE={} DEFAULT CHARSET={}",
            quote_identifier(&table),
            definitions.join(", "),
            engine,
            charset
        );
        Self {
            table,
            columns,
            engine,
            charset,
            statement,
            ignored,
        }
    }

    /// Returns the column definitions in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[(String, String)] {
        &self.columns
    }

    /// Returns the storage engine.
    #[must_use]
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Returns the default charset.
    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
    }
}

/// `DROP TABLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTable {
    table: String,
    statement: String,
    ignored: IgnoredErrors,
}

impl DropTable {
    pub(crate) fn new(table: String, ignored: IgnoredErrors) -> Self {
        let statement = format!("DROP TABLE {}", quote_identifier(&table));
        Self {
            table,
            statement,
            ignored,
        }
    }
}

/// `ALTER TABLE ... ADD COLUMN`, optionally positioned after another column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddColumn {
    table: String,
    column: String,
    column_type: String,
    after: Option<String>,
    statement: String,
    ignored: IgnoredErrors,
}

impl AddColumn {
    pub(crate) fn new(
        table: String,
        column: String,
        column_type: String,
        after: Option<String>,
        ignored: IgnoredErrors,
    ) -> Self {
        let mut statement = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_identifier(&table),
            quote_identifier(&column),
            column_type
        );
        if let Some(after) = &after {
            statement.push_str(" AFTER ");
            statement.push_str(&quote_identifier(after));
        }
        Self {
            table,
            column,
            column_type,
            after,
            statement,
            ignored,
        }
    }

    /// Returns the column name.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Returns the column type definition.
    #[must_use]
    pub fn column_type(&self) -> &str {
        &self.column_type
    }

    /// Returns the column this one is placed after; `None` appends.
    #[must_use]
    pub fn after(&self) -> Option<&str> {
        self.after.as_deref()
    }
}

fn change_clause(column: &str, column_type: &str) -> String {
    let quoted = quote_identifier(column);
    format!("CHANGE {quoted} {quoted} {column_type}")
}

/// `ALTER TABLE ... CHANGE` keeping the column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeColumnType {
    table: String,
    column: String,
    column_type: String,
    statement: String,
    ignored: IgnoredErrors,
}

impl ChangeColumnType {
    pub(crate) fn new(
        table: String,
        column: String,
        column_type: String,
        ignored: IgnoredErrors,
    ) -> Self {
        let statement = format!(
            "ALTER TABLE {} {}",
            quote_identifier(&table),
            change_clause(&column, &column_type)
        );
        Self {
            table,
            column,
            column_type,
            statement,
            ignored,
        }
    }

    /// Returns the column name.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Returns the new type definition.
    #[must_use]
    pub fn column_type(&self) -> &str {
        &self.column_type
    }
}

/// Several `CHANGE` clauses in one `ALTER TABLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeColumnTypes {
    table: String,
    columns: Vec<(String, String)>,
    statement: String,
    ignored: IgnoredErrors,
}

impl ChangeColumnTypes {
    pub(crate) fn new(table: String, columns: Vec<(String, String)>, ignored: IgnoredErrors) -> Self {
        let changes: Vec<String> = columns
            .iter()
            .map(|(column, column_type)| change_clause(column, column_type))
            .collect();
        let statement = format!(
            "ALTER TABLE {} {}",
            quote_identifier(&table),
            changes.join(", ")
        );
        Self {
            table,
            columns,
            statement,
            ignored,
        }
    }

    /// Returns the `(column, new type)` pairs in order.
    #[must_use]
    pub fn columns(&self) -> &[(String, String)] {
        &self.columns
    }
}

/// A plain (non-unique) index over one or more columns.
///
/// Column entries may carry a length qualifier such as `col(10)`; the entry
/// is quoted as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddIndex {
    table: String,
    columns: Vec<String>,
    statement: String,
    ignored: IgnoredErrors,
}

impl AddIndex {
    pub(crate) fn new(table: String, columns: Vec<String>, ignored: IgnoredErrors) -> Self {
        let quoted: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
        let statement = format!(
            "ALTER TABLE {} ADD INDEX({})",
            quote_identifier(&table),
            quoted.join(", ")
        );
        Self {
            table,
            columns,
            statement,
            ignored,
        }
    }

    /// Returns the indexed column expressions.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// `INSERT INTO` with literal values.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    table: String,
    values: Vec<(String, SqlValue)>,
    statement: String,
    ignored: IgnoredErrors,
}

impl Insert {
    pub(crate) fn new(table: String, values: Vec<(String, SqlValue)>, ignored: IgnoredErrors) -> Self {
        let columns: Vec<String> = values.iter().map(|(c, _)| quote_identifier(c)).collect();
        let literals: Vec<String> = values.iter().map(|(_, v)| v.to_literal()).collect();
        let statement = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&table),
            columns.join(", "),
            literals.join(",")
        );
        Self {
            table,
            values,
            statement,
            ignored,
        }
    }

    /// Returns the `(column, value)` pairs in order.
    #[must_use]
    pub fn values(&self) -> &[(String, SqlValue)] {
        &self.values
    }
}

/// Many rows loaded in bulk when the store allows it, one by one otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchInsert {
    table: String,
    column_names: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    surface_bulk_errors: bool,
    charset: String,
    ignored: IgnoredErrors,
}

impl BatchInsert {
    pub(crate) fn new(
        table: String,
        column_names: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
        surface_bulk_errors: bool,
        charset: String,
    ) -> Self {
        Self {
            table,
            column_names,
            rows,
            surface_bulk_errors,
            charset,
            ignored: IgnoredErrors::none(),
        }
    }

    /// Returns the prefixed table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the unquoted column names.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Returns the rows to insert.
    #[must_use]
    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    /// Returns the charset of the bulk-load data.
    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Whether a failed bulk load is returned as an error instead of falling
    /// back to row-by-row inserts.
    #[must_use]
    pub const fn surfaces_bulk_errors(&self) -> bool {
        self.surface_bulk_errors
    }

    /// Returns the per-row statement used by the fallback path.
    ///
    /// Rows that collide with an existing unique key are skipped.
    #[must_use]
    pub fn row_statement(&self) -> String {
        let columns: Vec<String> = self
            .column_names
            .iter()
            .map(|c| quote_identifier(c))
            .collect();
        let placeholders = vec!["?"; self.column_names.len()];
        format!(
            "INSERT IGNORE INTO {} ({}) VALUES ({})",
            quote_identifier(&self.table),
            columns.join(", "),
            placeholders.join(", ")
        )
    }
}
