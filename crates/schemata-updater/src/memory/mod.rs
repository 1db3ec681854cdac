//! In-process MySQL-compatible store.
//!
//! [`MemoryStore`] interprets the DDL and DML forms migrations use and
//! answers with the same error codes a MySQL server would, so dry runs and
//! tests exercise the real ignorable-error paths. Each statement is applied
//! to a copy of the affected table and committed only when it succeeds.

mod lexer;
mod parser;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use schemata_core::{BatchInsert, SqlValue};

use crate::error::StoreError;
use crate::store::{Row, SchemaStore};

use parser::{
    AlterAction, ColumnDef, ColumnDefault, ColumnKind, Condition, Expr, IndexColumn, InsertMode,
    KeyDef, KeyKind, Order, Position, Projection, Statement,
};

const ER_TABLE_EXISTS: u16 = 1050;
const ER_BAD_TABLE: u16 = 1051;
const ER_BAD_NULL: u16 = 1048;
const ER_BAD_FIELD: u16 = 1054;
const ER_DUP_FIELDNAME: u16 = 1060;
const ER_DUP_KEYNAME: u16 = 1061;
const ER_DUP_ENTRY: u16 = 1062;
const ER_PARSE: u16 = 1064;
const ER_MULTIPLE_PRI_KEY: u16 = 1068;
const ER_KEY_COLUMN_DOES_NOT_EXIST: u16 = 1072;
const ER_WRONG_VALUE_COUNT_ON_ROW: u16 = 1136;
const ER_NO_SUCH_TABLE: u16 = 1146;
const ER_WRONG_ARGUMENTS: u16 = 1210;
const ER_OPTION_PREVENTS_STATEMENT: u16 = 1290;

/// How the store answers bulk loads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BulkLoadMode {
    /// Bulk loading is not offered.
    #[default]
    Disabled,
    /// Bulk loads insert all rows in one step.
    Enabled,
    /// Bulk loading is offered but every attempt is refused by the server
    /// (`secure-file-priv`).
    Rejected,
}

/// An index as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Key name; `PRIMARY` for the primary key.
    pub name: String,
    /// Indexed columns in order.
    pub columns: Vec<String>,
    /// Whether the key rejects duplicates.
    pub unique: bool,
}

#[derive(Debug, Clone)]
struct Index {
    name: String,
    kind: KeyKind,
    columns: Vec<IndexColumn>,
}

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<ColumnDef>,
    indexes: Vec<Index>,
    rows: Vec<Vec<SqlValue>>,
    next_auto_increment: i64,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    history: Vec<String>,
}

/// Result of one statement.
#[derive(Debug, Default)]
struct Outcome {
    affected: u64,
    rows: Vec<Row>,
}

impl Outcome {
    fn affected(affected: u64) -> Self {
        Self {
            affected,
            rows: Vec::new(),
        }
    }
}

/// In-memory store. Clones share the same tables.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    database: String,
    bulk_load: BulkLoadMode,
    state: Arc<Mutex<State>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            database: String::from("memory"),
            bulk_load: BulkLoadMode::Disabled,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Sets the database name used in error messages.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sets how bulk loads are answered.
    #[must_use]
    pub fn with_bulk_load(mut self, mode: BulkLoadMode) -> Self {
        self.bulk_load = mode;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the table names in sorted order.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.lock().tables.keys().cloned().collect()
    }

    /// Returns true if `table` exists.
    #[must_use]
    pub fn has_table(&self, table: &str) -> bool {
        self.lock().tables.contains_key(table)
    }

    /// Returns the column names of `table` in order.
    #[must_use]
    pub fn column_names(&self, table: &str) -> Option<Vec<String>> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
    }

    /// Returns the type definition of a column as it was declared.
    #[must_use]
    pub fn column_definition(&self, table: &str, column: &str) -> Option<String> {
        let state = self.lock();
        let table = state.tables.get(table)?;
        let index = table.column_index(column)?;
        Some(table.columns[index].definition.clone())
    }

    /// Returns the indexes of `table`.
    #[must_use]
    pub fn indexes(&self, table: &str) -> Option<Vec<IndexInfo>> {
        self.lock().tables.get(table).map(|t| {
            t.indexes
                .iter()
                .map(|index| IndexInfo {
                    name: index.name.clone(),
                    columns: index.columns.iter().map(|c| c.name.clone()).collect(),
                    unique: index.kind != KeyKind::Index,
                })
                .collect()
        })
    }

    /// Returns all rows of `table`.
    #[must_use]
    pub fn rows(&self, table: &str) -> Option<Vec<Row>> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.iter().map(|row| t.to_row(row)).collect())
    }

    /// Returns every statement received, in order, including failed ones.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    fn run(&self, statement: &str, binds: &[SqlValue]) -> Result<Outcome, StoreError> {
        let mut state = self.lock();
        state.history.push(statement.to_string());

        let parsed = parser::parse(statement)
            .map_err(|e| StoreError::database(ER_PARSE, e.to_string()))?;
        if parsed.params != binds.len() {
            return Err(StoreError::database(
                ER_WRONG_ARGUMENTS,
                format!(
                    "Incorrect arguments to mysqld_stmt_execute: expected {} parameters, got {}",
                    parsed.params,
                    binds.len()
                ),
            ));
        }
        state.apply(&self.database, parsed.statement, binds)
    }
}

#[async_trait]
impl SchemaStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn execute(&self, statement: &str, binds: &[SqlValue]) -> Result<u64, StoreError> {
        self.run(statement, binds).map(|outcome| outcome.affected)
    }

    async fn fetch_all(
        &self,
        statement: &str,
        binds: &[SqlValue],
    ) -> Result<Vec<Row>, StoreError> {
        self.run(statement, binds).map(|outcome| outcome.rows)
    }

    fn supports_bulk_load(&self) -> bool {
        self.bulk_load != BulkLoadMode::Disabled
    }

    async fn bulk_load(&self, batch: &BatchInsert) -> Result<u64, StoreError> {
        match self.bulk_load {
            BulkLoadMode::Disabled => Err(StoreError::Unsupported(format!(
                "bulk load into `{}` on memory",
                batch.table()
            ))),
            BulkLoadMode::Rejected => Err(StoreError::database(
                ER_OPTION_PREVENTS_STATEMENT,
                "The MySQL server is running with the --secure-file-priv option so it cannot \
                 execute this statement",
            )),
            BulkLoadMode::Enabled => {
                let mut state = self.lock();
                state
                    .history
                    .push(format!("LOAD DATA INFILE INTO TABLE `{}`", batch.table()));
                state.insert(
                    &self.database,
                    InsertMode::Insert,
                    batch.table(),
                    Some(batch.column_names().to_vec()),
                    batch.rows().to_vec(),
                )
                .map(|outcome| outcome.affected)
            }
        }
    }
}

fn no_such_table(database: &str, table: &str) -> StoreError {
    StoreError::database(
        ER_NO_SUCH_TABLE,
        format!("Table '{database}.{table}' doesn't exist"),
    )
}

fn table_exists(table: &str) -> StoreError {
    StoreError::database(ER_TABLE_EXISTS, format!("Table '{table}' already exists"))
}

fn unknown_column(column: &str, scope: &str) -> StoreError {
    StoreError::database(
        ER_BAD_FIELD,
        format!("Unknown column '{column}' in '{scope}'"),
    )
}

fn resolve(expr: Expr, binds: &[SqlValue]) -> SqlValue {
    match expr {
        Expr::Value(value) => value,
        Expr::Param(index) => binds.get(index).cloned().unwrap_or(SqlValue::Null),
    }
}

fn current_timestamp() -> SqlValue {
    SqlValue::Text(chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Parses the numeric prefix of a string the way MySQL casts text to
/// numbers: `"12abc"` is 12, `"abc"` is 0.
fn leading_number(text: &str) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (i, c) in text.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return 0.0;
    }
    text[..end].trim_end_matches('.').parse().unwrap_or(0.0)
}

#[allow(clippy::cast_precision_loss)]
fn to_float(value: &SqlValue) -> f64 {
    match value {
        SqlValue::Null => 0.0,
        SqlValue::Bool(b) => f64::from(u8::from(*b)),
        SqlValue::Int(n) => *n as f64,
        SqlValue::Float(f) => *f,
        SqlValue::Text(s) => leading_number(s),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_integer(value: &SqlValue) -> i64 {
    match value {
        SqlValue::Int(n) => *n,
        // Float to int casts saturate.
        other => to_float(other).round() as i64,
    }
}

/// Converts a non-null value to the column's storage class. Out-of-range
/// integers are clamped like MySQL's non-strict mode.
fn convert(kind: ColumnKind, value: SqlValue) -> SqlValue {
    match (kind, value) {
        (_, SqlValue::Null) => SqlValue::Null,
        (ColumnKind::Integer { min, max }, value) => SqlValue::Int(to_integer(&value).clamp(min, max)),
        (ColumnKind::Float, value) => SqlValue::Float(to_float(&value)),
        (ColumnKind::Text, SqlValue::Text(s)) => SqlValue::Text(s),
        (ColumnKind::Text, value) => SqlValue::Text(value.to_string()),
        (ColumnKind::Other, SqlValue::Bool(b)) => SqlValue::Int(i64::from(b)),
        (ColumnKind::Other, value) => value,
    }
}

fn implicit_default(kind: ColumnKind) -> SqlValue {
    match kind {
        ColumnKind::Integer { .. } => SqlValue::Int(0),
        ColumnKind::Float => SqlValue::Float(0.0),
        ColumnKind::Text | ColumnKind::Other => SqlValue::Text(String::new()),
    }
}

fn default_for(column: &ColumnDef) -> SqlValue {
    match &column.default {
        Some(ColumnDefault::Value(value)) => convert(column.kind, value.clone()),
        Some(ColumnDefault::CurrentTimestamp) => current_timestamp(),
        None if column.nullable || column.auto_increment => SqlValue::Null,
        None => implicit_default(column.kind),
    }
}

/// Converts a value written by INSERT or UPDATE.
fn coerce(column: &ColumnDef, value: SqlValue) -> Result<SqlValue, StoreError> {
    if value.is_null() && !column.nullable && !column.auto_increment {
        return Err(StoreError::database(
            ER_BAD_NULL,
            format!("Column '{}' cannot be null", column.name),
        ));
    }
    Ok(convert(column.kind, value))
}

fn is_numeric(value: &SqlValue) -> bool {
    matches!(
        value,
        SqlValue::Bool(_) | SqlValue::Int(_) | SqlValue::Float(_)
    )
}

/// Equality under MySQL's comparison rules with a case-insensitive
/// collation. NULL equals nothing.
fn values_equal(left: &SqlValue, right: &SqlValue) -> bool {
    match (left, right) {
        (SqlValue::Null, _) | (_, SqlValue::Null) => false,
        (SqlValue::Text(a), SqlValue::Text(b)) => a.eq_ignore_ascii_case(b),
        (a, b) => (to_float(a) - to_float(b)).abs() < f64::EPSILON,
    }
}

fn compare_values(left: &SqlValue, right: &SqlValue) -> Ordering {
    match (left, right) {
        (SqlValue::Null, SqlValue::Null) => Ordering::Equal,
        (SqlValue::Null, _) => Ordering::Less,
        (_, SqlValue::Null) => Ordering::Greater,
        (a, b) if is_numeric(a) || is_numeric(b) => to_float(a)
            .partial_cmp(&to_float(b))
            .unwrap_or(Ordering::Equal),
        (a, b) => a
            .to_string()
            .to_lowercase()
            .cmp(&b.to_string().to_lowercase()),
    }
}

fn key_part(value: &SqlValue, length: Option<usize>) -> SqlValue {
    match (value, length) {
        (SqlValue::Text(s), Some(length)) => SqlValue::Text(s.chars().take(length).collect()),
        (value, _) => value.clone(),
    }
}

/// A compiled `WHERE` term.
enum Filter {
    Eq(usize, SqlValue),
    IsNull(usize, bool),
}

impl Filter {
    fn matches(&self, row: &[SqlValue]) -> bool {
        match self {
            Self::Eq(index, value) => values_equal(&row[*index], value),
            Self::IsNull(index, negated) => row[*index].is_null() != *negated,
        }
    }
}

impl Table {
    fn new() -> Self {
        Self {
            columns: Vec::new(),
            indexes: Vec::new(),
            rows: Vec::new(),
            next_auto_increment: 1,
        }
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn require_column(&self, name: &str, scope: &str) -> Result<usize, StoreError> {
        self.column_index(name)
            .ok_or_else(|| unknown_column(name, scope))
    }

    fn to_row(&self, values: &[SqlValue]) -> Row {
        Row::new(
            self.columns
                .iter()
                .zip(values)
                .map(|(c, v)| (c.name.clone(), v.clone()))
                .collect(),
        )
    }

    fn compile_filter(&self, conditions: Vec<Condition>, binds: &[SqlValue]) -> Result<Vec<Filter>, StoreError> {
        conditions
            .into_iter()
            .map(|condition| -> Result<Filter, StoreError> {
                match condition {
                    Condition::Eq(column, expr) => Ok(Filter::Eq(
                        self.require_column(&column, "where clause")?,
                        resolve(expr, binds),
                    )),
                    Condition::IsNull { column, negated } => Ok(Filter::IsNull(
                        self.require_column(&column, "where clause")?,
                        negated,
                    )),
                }
            })
            .collect()
    }

    /// Finds a row that collides with `row` on a unique key, skipping the
    /// row at `skip`. Returns the row index, key name and duplicate value.
    fn conflict(&self, row: &[SqlValue], skip: Option<usize>) -> Option<(usize, String, String)> {
        for index in self.indexes.iter().filter(|i| i.kind != KeyKind::Index) {
            let positions: Vec<(usize, Option<usize>)> = index
                .columns
                .iter()
                .filter_map(|c| self.column_index(&c.name).map(|p| (p, c.length)))
                .collect();
            let key: Vec<SqlValue> = positions
                .iter()
                .map(|(p, length)| key_part(&row[*p], *length))
                .collect();
            if key.iter().any(SqlValue::is_null) {
                continue;
            }

            let found = self.rows.iter().enumerate().find(|(i, other)| {
                Some(*i) != skip
                    && positions
                        .iter()
                        .zip(&key)
                        .all(|((p, length), value)| values_equal(&key_part(&other[*p], *length), value))
            });
            if let Some((i, _)) = found {
                let shown: Vec<String> = key.iter().map(ToString::to_string).collect();
                return Some((i, index.name.clone(), shown.join("-")));
            }
        }
        None
    }

    fn duplicate_entry(value: &str, key: &str) -> StoreError {
        StoreError::database(
            ER_DUP_ENTRY,
            format!("Duplicate entry '{value}' for key '{key}'"),
        )
    }

    fn assign_auto_increment(&mut self, row: &mut [SqlValue]) {
        let Some(index) = self.columns.iter().position(|c| c.auto_increment) else {
            return;
        };
        match row[index].as_i64() {
            Some(n) if n > 0 => {
                self.next_auto_increment = self.next_auto_increment.max(n + 1);
            }
            _ => {
                row[index] = SqlValue::Int(self.next_auto_increment);
                self.next_auto_increment += 1;
            }
        }
    }

    fn generated_key_name(&self, first_column: &str) -> String {
        let taken = |name: &str| self.indexes.iter().any(|i| i.name.eq_ignore_ascii_case(name));
        if !taken(first_column) {
            return first_column.to_string();
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{first_column}_{suffix}");
            if !taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    fn add_key(&mut self, key: KeyDef) -> Result<(), StoreError> {
        let mut columns = Vec::with_capacity(key.columns.len());
        for column in key.columns {
            let Some(position) = self.column_index(&column.name) else {
                return Err(StoreError::database(
                    ER_KEY_COLUMN_DOES_NOT_EXIST,
                    format!("Key column '{}' doesn't exist in table", column.name),
                ));
            };
            columns.push(IndexColumn {
                name: self.columns[position].name.clone(),
                length: column.length,
            });
        }

        let name = match key.kind {
            KeyKind::Primary => {
                if self.indexes.iter().any(|i| i.kind == KeyKind::Primary) {
                    return Err(StoreError::database(
                        ER_MULTIPLE_PRI_KEY,
                        "Multiple primary key defined",
                    ));
                }
                for column in &columns {
                    if let Some(position) = self.column_index(&column.name) {
                        self.columns[position].nullable = false;
                    }
                }
                String::from("PRIMARY")
            }
            _ => match key.name {
                Some(name) => {
                    if self.indexes.iter().any(|i| i.name.eq_ignore_ascii_case(&name)) {
                        return Err(StoreError::database(
                            ER_DUP_KEYNAME,
                            format!("Duplicate key name '{name}'"),
                        ));
                    }
                    name
                }
                None => self.generated_key_name(&columns[0].name),
            },
        };

        self.indexes.push(Index {
            name,
            kind: key.kind,
            columns,
        });

        if key.kind != KeyKind::Index {
            for i in 0..self.rows.len() {
                if let Some((_, key, value)) = self.conflict(&self.rows[i], Some(i)) {
                    return Err(Self::duplicate_entry(&value, &key));
                }
            }
        }
        Ok(())
    }

    fn inline_keys(column: &ColumnDef) -> Vec<KeyDef> {
        let key = |kind| KeyDef {
            kind,
            name: None,
            columns: vec![IndexColumn {
                name: column.name.clone(),
                length: None,
            }],
        };
        let mut keys = Vec::new();
        if column.primary_key {
            keys.push(key(KeyKind::Primary));
        }
        if column.unique {
            keys.push(key(KeyKind::Unique));
        }
        keys
    }

    fn target_index(&self, table: &str, position: &Position, unchanged: usize) -> Result<usize, StoreError> {
        match position {
            Position::Unchanged => Ok(unchanged),
            Position::First => Ok(0),
            Position::After(after) => self
                .column_index(after)
                .map(|i| i + 1)
                .ok_or_else(|| unknown_column(after, table)),
        }
    }

    fn add_column(&mut self, table: &str, column: ColumnDef, position: &Position) -> Result<(), StoreError> {
        if self.column_index(&column.name).is_some() {
            return Err(StoreError::database(
                ER_DUP_FIELDNAME,
                format!("Duplicate column name '{}'", column.name),
            ));
        }
        let at = self.target_index(table, position, self.columns.len())?;
        let keys = Self::inline_keys(&column);

        let fill = default_for(&column);
        for row in &mut self.rows {
            row.insert(at, fill.clone());
        }
        if column.auto_increment {
            for row in &mut self.rows {
                row[at] = SqlValue::Int(self.next_auto_increment);
                self.next_auto_increment += 1;
            }
        }
        self.columns.insert(at, column);

        for key in keys {
            self.add_key(key)?;
        }
        Ok(())
    }

    fn change_column(
        &mut self,
        table: &str,
        from: &str,
        column: ColumnDef,
        position: &Position,
    ) -> Result<(), StoreError> {
        let index = self.column_index(from).ok_or_else(|| unknown_column(from, table))?;
        if let Some(other) = self.column_index(&column.name) {
            if other != index {
                return Err(StoreError::database(
                    ER_DUP_FIELDNAME,
                    format!("Duplicate column name '{}'", column.name),
                ));
            }
        }

        let old_name = self.columns[index].name.clone();
        for key in &mut self.indexes {
            for key_column in &mut key.columns {
                if key_column.name.eq_ignore_ascii_case(&old_name) {
                    key_column.name.clone_from(&column.name);
                }
            }
        }

        for row in &mut self.rows {
            let value = std::mem::replace(&mut row[index], SqlValue::Null);
            row[index] = if value.is_null() && !column.nullable {
                implicit_default(column.kind)
            } else {
                convert(column.kind, value)
            };
        }

        let keys = Self::inline_keys(&column);
        let column_name = column.name.clone();
        self.columns[index] = column;

        if *position != Position::Unchanged {
            let moved = self.columns.remove(index);
            let values: Vec<SqlValue> = self.rows.iter_mut().map(|row| row.remove(index)).collect();
            let at = match self.target_index(table, position, index) {
                Ok(at) => at,
                Err(_) if matches!(position, Position::After(a) if a.eq_ignore_ascii_case(&column_name)) => index,
                Err(e) => return Err(e),
            };
            self.columns.insert(at, moved);
            for (row, value) in self.rows.iter_mut().zip(values) {
                row.insert(at, value);
            }
        }

        for key in keys {
            if key.kind == KeyKind::Primary
                && self.indexes.iter().any(|i| {
                    i.kind == KeyKind::Primary
                        && i.columns.len() == 1
                        && i.columns[0].name.eq_ignore_ascii_case(&column_name)
                })
            {
                continue;
            }
            self.add_key(key)?;
        }
        Ok(())
    }
}

impl State {
    fn table(&self, database: &str, name: &str) -> Result<&Table, StoreError> {
        self.tables
            .get(name)
            .ok_or_else(|| no_such_table(database, name))
    }

    fn apply(
        &mut self,
        database: &str,
        statement: Statement,
        binds: &[SqlValue],
    ) -> Result<Outcome, StoreError> {
        match statement {
            Statement::CreateTable {
                table,
                if_not_exists,
                columns,
                keys,
            } => self.create_table(table, if_not_exists, columns, keys),
            Statement::DropTable { tables, if_exists } => {
                self.drop_tables(database, &tables, if_exists)
            }
            Statement::AlterTable { table, actions } => self.alter_table(database, &table, actions),
            Statement::Insert {
                mode,
                table,
                columns,
                rows,
            } => {
                let rows = rows
                    .into_iter()
                    .map(|row| row.into_iter().map(|e| resolve(e, binds)).collect())
                    .collect();
                self.insert(database, mode, &table, columns, rows)
            }
            Statement::Update {
                table,
                ignore,
                assignments,
                filter,
            } => self.update(database, &table, ignore, assignments, filter, binds),
            Statement::Delete { table, filter } => {
                let target = self
                    .tables
                    .get_mut(&table)
                    .ok_or_else(|| no_such_table(database, &table))?;
                let filter = target.compile_filter(filter, binds)?;
                let before = target.rows.len();
                target
                    .rows
                    .retain(|row| !filter.iter().all(|f| f.matches(row)));
                Ok(Outcome::affected((before - target.rows.len()) as u64))
            }
            Statement::Select {
                projection,
                table,
                filter,
                order,
                limit,
            } => self.select(database, &table, projection, filter, order, limit, binds),
        }
    }

    fn create_table(
        &mut self,
        name: String,
        if_not_exists: bool,
        columns: Vec<ColumnDef>,
        keys: Vec<KeyDef>,
    ) -> Result<Outcome, StoreError> {
        if self.tables.contains_key(&name) {
            if if_not_exists {
                return Ok(Outcome::default());
            }
            return Err(table_exists(&name));
        }

        let mut table = Table::new();
        for column in columns {
            table.add_column(&name, column, &Position::Unchanged)?;
        }
        for key in keys {
            table.add_key(key)?;
        }
        self.tables.insert(name, table);
        Ok(Outcome::default())
    }

    fn drop_tables(
        &mut self,
        database: &str,
        tables: &[String],
        if_exists: bool,
    ) -> Result<Outcome, StoreError> {
        let missing: Vec<String> = tables
            .iter()
            .filter(|t| !self.tables.contains_key(*t))
            .map(|t| format!("{database}.{t}"))
            .collect();
        if !missing.is_empty() && !if_exists {
            return Err(StoreError::database(
                ER_BAD_TABLE,
                format!("Unknown table '{}'", missing.join(",")),
            ));
        }
        for table in tables {
            self.tables.remove(table);
        }
        Ok(Outcome::default())
    }

    fn alter_table(
        &mut self,
        database: &str,
        name: &str,
        actions: Vec<AlterAction>,
    ) -> Result<Outcome, StoreError> {
        let mut table = self.table(database, name)?.clone();
        for action in actions {
            match action {
                AlterAction::AddColumn { column, position } => {
                    table.add_column(name, column, &position)?;
                }
                AlterAction::ChangeColumn {
                    from,
                    column,
                    position,
                } => table.change_column(name, &from, column, &position)?,
                AlterAction::AddKey(key) => table.add_key(key)?,
            }
        }

        let affected = table.rows.len() as u64;
        self.tables.insert(name.to_string(), table);
        Ok(Outcome::affected(affected))
    }

    fn insert(
        &mut self,
        database: &str,
        mode: InsertMode,
        name: &str,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<Outcome, StoreError> {
        let mut table = self.table(database, name)?.clone();
        let targets: Vec<usize> = match columns {
            Some(names) => names
                .iter()
                .map(|n| table.require_column(n, "field list"))
                .collect::<Result<_, _>>()?,
            None => (0..table.columns.len()).collect(),
        };

        let mut affected = 0;
        for (number, values) in rows.into_iter().enumerate() {
            if values.len() != targets.len() {
                return Err(StoreError::database(
                    ER_WRONG_VALUE_COUNT_ON_ROW,
                    format!("Column count doesn't match value count at row {}", number + 1),
                ));
            }

            let mut row: Vec<SqlValue> = table.columns.iter().map(default_for).collect();
            for (&index, value) in targets.iter().zip(values) {
                row[index] = coerce(&table.columns[index], value)?;
            }
            table.assign_auto_increment(&mut row);

            if let Some((_, key, value)) = table.conflict(&row, None) {
                match mode {
                    InsertMode::Ignore => continue,
                    InsertMode::Insert => return Err(Table::duplicate_entry(&value, &key)),
                    InsertMode::Replace => {
                        while let Some((existing, _, _)) = table.conflict(&row, None) {
                            table.rows.remove(existing);
                            affected += 1;
                        }
                    }
                }
            }
            table.rows.push(row);
            affected += 1;
        }

        self.tables.insert(name.to_string(), table);
        Ok(Outcome::affected(affected))
    }

    fn update(
        &mut self,
        database: &str,
        name: &str,
        ignore: bool,
        assignments: Vec<(String, Expr)>,
        filter: Vec<Condition>,
        binds: &[SqlValue],
    ) -> Result<Outcome, StoreError> {
        let mut table = self.table(database, name)?.clone();
        let assignments: Vec<(usize, SqlValue)> = assignments
            .into_iter()
            .map(|(column, expr)| -> Result<(usize, SqlValue), StoreError> {
                let index = table.require_column(&column, "field list")?;
                Ok((index, coerce(&table.columns[index], resolve(expr, binds))?))
            })
            .collect::<Result<_, _>>()?;
        let filter = table.compile_filter(filter, binds)?;

        let mut affected = 0;
        for i in 0..table.rows.len() {
            if !filter.iter().all(|f| f.matches(&table.rows[i])) {
                continue;
            }
            let mut updated = table.rows[i].clone();
            for (index, value) in &assignments {
                updated[*index] = value.clone();
            }
            if updated == table.rows[i] {
                continue;
            }
            if let Some((_, key, value)) = table.conflict(&updated, Some(i)) {
                if ignore {
                    continue;
                }
                return Err(Table::duplicate_entry(&value, &key));
            }
            table.rows[i] = updated;
            affected += 1;
        }

        self.tables.insert(name.to_string(), table);
        Ok(Outcome::affected(affected))
    }

    #[allow(clippy::too_many_arguments)]
    fn select(
        &self,
        database: &str,
        name: &str,
        projection: Projection,
        filter: Vec<Condition>,
        order: Option<Order>,
        limit: Option<usize>,
        binds: &[SqlValue],
    ) -> Result<Outcome, StoreError> {
        let table = self.table(database, name)?;
        let filter = table.compile_filter(filter, binds)?;
        let mut matching: Vec<&Vec<SqlValue>> = table
            .rows
            .iter()
            .filter(|row| filter.iter().all(|f| f.matches(row)))
            .collect();

        if let Some(order) = order {
            let index = table.require_column(&order.column, "order clause")?;
            matching.sort_by(|a, b| {
                let ordering = compare_values(&a[index], &b[index]);
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        if let Some(limit) = limit {
            matching.truncate(limit);
        }

        let rows = match projection {
            Projection::All => matching.into_iter().map(|row| table.to_row(row)).collect(),
            Projection::Columns(columns) => {
                let indexes: Vec<usize> = columns
                    .iter()
                    .map(|c| table.require_column(c, "field list"))
                    .collect::<Result<_, _>>()?;
                matching
                    .into_iter()
                    .map(|row| {
                        Row::new(
                            indexes
                                .iter()
                                .zip(&columns)
                                .map(|(i, c)| (c.clone(), row[*i].clone()))
                                .collect(),
                        )
                    })
                    .collect()
            }
        };

        Ok(Outcome { affected: 0, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemata_core::ErrorCode;

    async fn exec(store: &MemoryStore, sql: &str) -> Result<u64, StoreError> {
        store.execute(sql, &[]).await
    }

    fn code(result: Result<u64, StoreError>) -> Option<ErrorCode> {
        result.err().and_then(|e| e.code())
    }

    #[tokio::test]
    async fn test_create_and_drop_table_codes() {
        let store = MemoryStore::new();
        let create = "CREATE TABLE `t` (`id` INT(11) NOT NULL) ENGINE=InnoDB DEFAULT CHARSET=utf8";
        exec(&store, create).await.unwrap();
        assert_eq!(code(exec(&store, create).await), Some(ErrorCode(1050)));
        exec(&store, "CREATE TABLE IF NOT EXISTS `t` (`id` INT)")
            .await
            .unwrap();

        exec(&store, "DROP TABLE `t`").await.unwrap();
        assert_eq!(code(exec(&store, "DROP TABLE `t`").await), Some(ErrorCode(1051)));
        exec(&store, "DROP TABLE IF EXISTS `t`").await.unwrap();
        assert_eq!(
            code(exec(&store, "ALTER TABLE `t` ADD COLUMN `c` INT").await),
            Some(ErrorCode(1146))
        );
    }

    #[tokio::test]
    async fn test_syntax_error_code() {
        let store = MemoryStore::new();
        let err = exec(&store, "THIS IS NOT SQL").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode(1064)));
        assert!(err.to_string().contains("error in your SQL syntax"));
        assert_eq!(store.history(), vec!["THIS IS NOT SQL".to_string()]);
    }

    #[tokio::test]
    async fn test_add_column_positions_and_duplicates() {
        let store = MemoryStore::new();
        exec(&store, "CREATE TABLE t (a INT, c INT)").await.unwrap();
        exec(&store, "INSERT INTO t VALUES (1, 3)").await.unwrap();
        exec(&store, "ALTER TABLE t ADD COLUMN b VARCHAR(10) NOT NULL AFTER a")
            .await
            .unwrap();
        exec(&store, "ALTER TABLE t ADD COLUMN z INT DEFAULT 7 FIRST")
            .await
            .unwrap();
        assert_eq!(
            store.column_names("t").unwrap(),
            vec!["z", "a", "b", "c"]
        );
        let rows = store.rows("t").unwrap();
        assert_eq!(rows[0].get("z"), Some(&SqlValue::Int(7)));
        assert_eq!(rows[0].get("b"), Some(&SqlValue::Text(String::new())));

        assert_eq!(
            code(exec(&store, "ALTER TABLE t ADD COLUMN B INT").await),
            Some(ErrorCode(1060))
        );
        assert_eq!(
            code(exec(&store, "ALTER TABLE t ADD COLUMN d INT AFTER missing").await),
            Some(ErrorCode(1054))
        );
    }

    #[tokio::test]
    async fn test_alter_is_atomic() {
        let store = MemoryStore::new();
        exec(&store, "CREATE TABLE t (a INT)").await.unwrap();
        let result = exec(
            &store,
            "ALTER TABLE t ADD COLUMN b INT, CHANGE `missing` `missing` INT",
        )
        .await;
        assert_eq!(code(result), Some(ErrorCode(1054)));
        assert_eq!(store.column_names("t").unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_change_column_clamps_and_renames_index_columns() {
        let store = MemoryStore::new();
        exec(&store, "CREATE TABLE t (a VARCHAR(10), b INT(11) NOT NULL)")
            .await
            .unwrap();
        exec(&store, "ALTER TABLE t ADD INDEX(`a`, `b`)").await.unwrap();
        exec(&store, "INSERT INTO t (a, b) VALUES ('x', 554934)")
            .await
            .unwrap();
        exec(&store, "ALTER TABLE t CHANGE `b` `b` SMALLINT(4) NOT NULL")
            .await
            .unwrap();
        assert_eq!(store.rows("t").unwrap()[0].get("b"), Some(&SqlValue::Int(32_767)));
        assert_eq!(
            store.column_definition("t", "b").as_deref(),
            Some("SMALLINT(4) NOT NULL")
        );

        exec(&store, "ALTER TABLE t CHANGE COLUMN `b` `e` SMALLINT(4) NOT NULL")
            .await
            .unwrap();
        assert_eq!(store.column_names("t").unwrap(), vec!["a", "e"]);
        assert_eq!(store.indexes("t").unwrap()[0].columns, vec!["a", "e"]);
    }

    #[tokio::test]
    async fn test_index_naming_and_errors() {
        let store = MemoryStore::new();
        exec(&store, "CREATE TABLE t (a INT, b VARCHAR(20))").await.unwrap();
        exec(&store, "ALTER TABLE t ADD INDEX(`a`, `b`)").await.unwrap();
        exec(&store, "ALTER TABLE t ADD INDEX(`a`)").await.unwrap();
        exec(&store, "ALTER TABLE t ADD INDEX named (`b`)").await.unwrap();

        let names: Vec<String> = store
            .indexes("t")
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["a", "a_2", "named"]);

        assert_eq!(
            code(exec(&store, "ALTER TABLE t ADD INDEX named (`a`)").await),
            Some(ErrorCode(1061))
        );
        assert_eq!(
            code(exec(&store, "ALTER TABLE t ADD INDEX(`missing`)").await),
            Some(ErrorCode(1072))
        );
        // A quoted entry is one column name; only a bare `b(1)` is a prefix.
        assert_eq!(
            code(exec(&store, "ALTER TABLE t ADD INDEX(`a`, `b(1)`)").await),
            Some(ErrorCode(1072))
        );
        exec(&store, "ALTER TABLE t ADD INDEX prefixed (`a`, b(1))").await.unwrap();
        assert_eq!(store.indexes("t").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_unique_keys() {
        let store = MemoryStore::new();
        exec(
            &store,
            "CREATE TABLE t (id INT NOT NULL AUTO_INCREMENT, name VARCHAR(20), PRIMARY KEY (id), UNIQUE KEY (name))",
        )
        .await
        .unwrap();
        assert_eq!(exec(&store, "INSERT INTO t (name) VALUES ('a'), ('b')").await.unwrap(), 2);
        let err = exec(&store, "INSERT INTO t (name) VALUES ('A')").await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode(1062)));
        assert_eq!(err.to_string(), "[1062] Duplicate entry 'A' for key 'name'");

        assert_eq!(
            exec(&store, "INSERT IGNORE INTO t (name) VALUES ('a'), ('c')")
                .await
                .unwrap(),
            1
        );
        let ids: Vec<SqlValue> = store
            .rows("t")
            .unwrap()
            .iter()
            .filter_map(|r| r.get("id").cloned())
            .collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], SqlValue::Int(1));

        exec(&store, "REPLACE INTO t (id, name) VALUES (1, 'z')")
            .await
            .unwrap();
        let rows = store
            .fetch_all("SELECT name FROM t WHERE id = ?", &[SqlValue::Int(1)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("name"), Some("z"));
    }

    #[tokio::test]
    async fn test_insert_errors() {
        let store = MemoryStore::new();
        exec(&store, "CREATE TABLE t (a INT NOT NULL, b TEXT)").await.unwrap();
        assert_eq!(
            code(exec(&store, "INSERT INTO t (a, b) VALUES (1)").await),
            Some(ErrorCode(1136))
        );
        assert_eq!(
            code(exec(&store, "INSERT INTO t (a, x) VALUES (1, 2)").await),
            Some(ErrorCode(1054))
        );
        assert_eq!(
            code(exec(&store, "INSERT INTO t (a) VALUES (NULL)").await),
            Some(ErrorCode(1048))
        );
        assert_eq!(
            code(store.execute("INSERT INTO t (a) VALUES (?)", &[]).await),
            Some(ErrorCode(1210))
        );
        assert!(store.rows("t").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_delete_select() {
        let store = MemoryStore::new();
        exec(&store, "CREATE TABLE d (id INT, login VARCHAR(20), layout TEXT)")
            .await
            .unwrap();
        exec(
            &store,
            "INSERT INTO d VALUES (1, 'admin', 'old'), (2, 'admin', 'old'), (1, 'other', 'old')",
        )
        .await
        .unwrap();

        let affected = store
            .execute(
                "UPDATE d SET layout = ? WHERE id = ? AND login = ?",
                &[SqlValue::from("new"), SqlValue::from("1"), SqlValue::from("admin")],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let rows = store
            .fetch_all("SELECT id, layout FROM d ORDER BY id DESC LIMIT 2", &[])
            .await
            .unwrap();
        assert_eq!(rows[0].get("id"), Some(&SqlValue::Int(2)));
        assert_eq!(rows.len(), 2);

        let updated = store.fetch_all("SELECT * FROM d WHERE layout = 'new'", &[]).await.unwrap();
        assert_eq!(updated.len(), 1);

        assert_eq!(exec(&store, "DELETE FROM d WHERE login = 'ADMIN'").await.unwrap(), 2);
        assert_eq!(store.rows("d").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_load_modes() {
        let store = MemoryStore::new();
        exec(&store, "CREATE TABLE t (a INT)").await.unwrap();
        let factory = schemata_core::MigrationFactory::with_prefix("");
        let schemata_core::Migration::BatchInsert(batch) =
            factory.batch_insert("t", ["a"], vec![vec![SqlValue::Int(1)]], false, None)
        else {
            panic!("expected batch insert");
        };

        assert!(!store.supports_bulk_load());
        assert!(matches!(
            store.bulk_load(&batch).await,
            Err(StoreError::Unsupported(_))
        ));

        let rejecting = store.clone().with_bulk_load(BulkLoadMode::Rejected);
        assert!(rejecting.supports_bulk_load());
        assert_eq!(
            rejecting.bulk_load(&batch).await.unwrap_err().code(),
            Some(ErrorCode(1290))
        );

        let loading = store.clone().with_bulk_load(BulkLoadMode::Enabled);
        assert_eq!(loading.bulk_load(&batch).await.unwrap(), 1);
        assert_eq!(store.rows("t").unwrap().len(), 1);
    }

    #[test]
    fn test_leading_number() {
        assert!((leading_number("12abc") - 12.0).abs() < f64::EPSILON);
        assert!((leading_number(" -3.5x") + 3.5).abs() < f64::EPSILON);
        assert!(leading_number("abc").abs() < f64::EPSILON);
    }
}
