//! Recursive descent parser for the statement subset of [`super::MemoryStore`].

use std::fmt;

use schemata_core::SqlValue;

use super::lexer::{Lexer, Token, TokenKind};

/// A value position in a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value.
    Value(SqlValue),
    /// Positional `?` parameter (zero-based).
    Param(usize),
}

/// A column's `DEFAULT` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    /// Constant default.
    Value(SqlValue),
    /// `CURRENT_TIMESTAMP` / `NOW()`.
    CurrentTimestamp,
}

/// Storage class of a column, which decides how values are converted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnKind {
    /// Integer types with their value range.
    Integer {
        /// Smallest storable value.
        min: i64,
        /// Largest storable value.
        max: i64,
    },
    /// Floating point and fixed point types.
    Float,
    /// Character, binary and enumeration types.
    Text,
    /// Temporal and anything else; values are kept as given.
    Other,
}

impl ColumnKind {
    fn classify(type_name: &str, unsigned: bool) -> Self {
        let (signed, max_unsigned) = match type_name {
            "TINYINT" | "BOOL" | "BOOLEAN" => ((-128, 127), 255),
            "SMALLINT" => ((-32_768, 32_767), 65_535),
            "MEDIUMINT" => ((-8_388_608, 8_388_607), 16_777_215),
            "INT" | "INTEGER" => ((-2_147_483_648, 2_147_483_647), 4_294_967_295),
            "BIGINT" => ((i64::MIN, i64::MAX), i64::MAX),
            "FLOAT" | "DOUBLE" | "REAL" | "DECIMAL" | "DEC" | "NUMERIC" => return Self::Float,
            "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "BINARY"
            | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "ENUM" | "SET" => {
                return Self::Text;
            }
            _ => return Self::Other,
        };
        if unsigned {
            Self::Integer {
                min: 0,
                max: max_unsigned,
            }
        } else {
            Self::Integer {
                min: signed.0,
                max: signed.1,
            }
        }
    }
}

/// A column definition from `CREATE TABLE` or `ALTER TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// Source text of the type and its attributes, e.g. `SMALLINT(4) NOT NULL`.
    pub definition: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
    pub auto_increment: bool,
    pub primary_key: bool,
    pub unique: bool,
}

/// One column of an index, with an optional prefix length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    pub name: String,
    pub length: Option<usize>,
}

/// Kind of table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Primary,
    Unique,
    Index,
}

/// A key definition.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDef {
    pub kind: KeyKind,
    pub name: Option<String>,
    pub columns: Vec<IndexColumn>,
}

/// Where an added or changed column goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    /// Keep in place (changes) or append (additions).
    Unchanged,
    First,
    After(String),
}

/// One `ALTER TABLE` action.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    AddColumn {
        column: ColumnDef,
        position: Position,
    },
    ChangeColumn {
        from: String,
        column: ColumnDef,
        position: Position,
    },
    AddKey(KeyDef),
}

/// Conflict handling of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    Insert,
    Ignore,
    Replace,
}

/// A `WHERE` term; terms are joined by `AND`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Expr),
    IsNull { column: String, negated: bool },
}

/// What a `SELECT` returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

/// `ORDER BY` on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable {
        table: String,
        if_not_exists: bool,
        columns: Vec<ColumnDef>,
        keys: Vec<KeyDef>,
    },
    DropTable {
        tables: Vec<String>,
        if_exists: bool,
    },
    AlterTable {
        table: String,
        actions: Vec<AlterAction>,
    },
    Insert {
        mode: InsertMode,
        table: String,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Expr>>,
    },
    Update {
        table: String,
        ignore: bool,
        assignments: Vec<(String, Expr)>,
        filter: Vec<Condition>,
    },
    Delete {
        table: String,
        filter: Vec<Condition>,
    },
    Select {
        projection: Projection,
        table: String,
        filter: Vec<Condition>,
        order: Option<Order>,
        limit: Option<usize>,
    },
}

/// A statement plus the number of `?` parameters it expects.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub statement: Statement,
    pub params: usize,
}

/// Syntax error, reported the way the server words it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    near: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "You have an error in your SQL syntax; check the manual that corresponds to your \
             MySQL server version for the right syntax to use near '{}'",
            self.near
        )
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// Parses one statement.
pub fn parse(sql: &str) -> ParseResult<Parsed> {
    let mut parser = Parser::new(sql);
    let statement = parser.statement()?;
    Ok(Parsed {
        statement,
        params: parser.params,
    })
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    params: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: Lexer::new(source).tokenize(),
            pos: 0,
            params: 0,
        }
    }

    // The token list always ends with `Eof` or `Error`, so it is never empty.
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn previous_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end)
    }

    fn error(&self) -> ParseError {
        let start = self.peek().span.start.min(self.source.len());
        ParseError {
            near: self.source[start..].chars().take(80).collect(),
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.peek().is_keyword(keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn identifier(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Word(name) | TokenKind::Quoted(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error()),
        }
    }

    /// Column reference, optionally qualified as `table.column`.
    fn column_ref(&mut self) -> ParseResult<String> {
        let name = self.identifier()?;
        if self.eat(&TokenKind::Dot) {
            return self.identifier();
        }
        Ok(name)
    }

    fn statement(&mut self) -> ParseResult<Statement> {
        let statement = if self.eat_keyword("CREATE") {
            self.create_table()?
        } else if self.eat_keyword("DROP") {
            self.drop_table()?
        } else if self.eat_keyword("ALTER") {
            self.alter_table()?
        } else if self.eat_keyword("INSERT") {
            let mode = if self.eat_keyword("IGNORE") {
                InsertMode::Ignore
            } else {
                InsertMode::Insert
            };
            self.insert(mode)?
        } else if self.eat_keyword("REPLACE") {
            self.insert(InsertMode::Replace)?
        } else if self.eat_keyword("UPDATE") {
            self.update()?
        } else if self.eat_keyword("DELETE") {
            self.delete()?
        } else if self.eat_keyword("SELECT") {
            self.select()?
        } else {
            return Err(self.error());
        };

        self.eat(&TokenKind::Semicolon);
        if !self.at(&TokenKind::Eof) {
            return Err(self.error());
        }
        Ok(statement)
    }

    fn create_table(&mut self) -> ParseResult<Statement> {
        self.expect_keyword("TABLE")?;
        let if_not_exists = if self.eat_keyword("IF") {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
            true
        } else {
            false
        };
        let table = self.identifier()?;

        self.expect(&TokenKind::LeftParen)?;
        let mut columns = Vec::new();
        let mut keys = Vec::new();
        loop {
            if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                keys.push(self.key_def(KeyKind::Primary)?);
            } else if self.eat_keyword("UNIQUE") {
                if !self.eat_keyword("KEY") {
                    self.eat_keyword("INDEX");
                }
                keys.push(self.key_def(KeyKind::Unique)?);
            } else if self.eat_keyword("KEY") || self.eat_keyword("INDEX") {
                keys.push(self.key_def(KeyKind::Index)?);
            } else {
                let name = self.identifier()?;
                columns.push(self.column_def(name)?);
            }

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen)?;
        self.table_options()?;

        Ok(Statement::CreateTable {
            table,
            if_not_exists,
            columns,
            keys,
        })
    }

    fn table_options(&mut self) -> ParseResult<()> {
        while !self.at(&TokenKind::Eof) && !self.at(&TokenKind::Semicolon) {
            self.eat_keyword("DEFAULT");
            if self.eat_keyword("CHARACTER") {
                self.expect_keyword("SET")?;
            } else if !matches!(self.peek().kind, TokenKind::Word(_)) {
                return Err(self.error());
            } else {
                self.advance();
            }
            self.eat(&TokenKind::Eq);
            match self.peek().kind {
                TokenKind::Word(_)
                | TokenKind::Quoted(_)
                | TokenKind::Str(_)
                | TokenKind::Integer(_) => {
                    self.advance();
                }
                _ => return Err(self.error()),
            }
            self.eat(&TokenKind::Comma);
        }
        Ok(())
    }

    /// Optional key name followed by the parenthesized column list.
    fn key_def(&mut self, kind: KeyKind) -> ParseResult<KeyDef> {
        let name = if self.at(&TokenKind::LeftParen) {
            None
        } else {
            Some(self.identifier()?)
        };
        let columns = self.key_columns()?;
        Ok(KeyDef {
            kind,
            name,
            columns,
        })
    }

    fn key_columns(&mut self) -> ParseResult<Vec<IndexColumn>> {
        self.expect(&TokenKind::LeftParen)?;
        let mut columns = Vec::new();
        loop {
            // A quoted `` `c(10)` `` names a column literally; only a bare
            // `c(10)` carries a prefix length.
            let mut column = IndexColumn {
                name: self.identifier()?,
                length: None,
            };
            if self.eat(&TokenKind::LeftParen) {
                match self.advance().kind {
                    TokenKind::Integer(n) if n > 0 => {
                        column.length = usize::try_from(n).ok();
                    }
                    _ => return Err(self.error()),
                }
                self.expect(&TokenKind::RightParen)?;
            }
            if !self.eat_keyword("ASC") {
                self.eat_keyword("DESC");
            }
            columns.push(column);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(columns)
    }

    fn skip_parenthesized(&mut self) -> ParseResult<()> {
        self.expect(&TokenKind::LeftParen)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.advance().kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => depth -= 1,
                TokenKind::Eof | TokenKind::Error(_) => return Err(self.error()),
                _ => {}
            }
        }
        Ok(())
    }

    fn column_def(&mut self, name: String) -> ParseResult<ColumnDef> {
        let start = self.peek().span.start;
        let type_name = match &self.peek().kind {
            TokenKind::Word(word) => word.to_ascii_uppercase(),
            _ => return Err(self.error()),
        };
        self.advance();
        if self.at(&TokenKind::LeftParen) {
            self.skip_parenthesized()?;
        }
        if type_name == "DOUBLE" {
            self.eat_keyword("PRECISION");
        }

        let mut unsigned = false;
        let mut column = ColumnDef {
            name,
            definition: String::new(),
            kind: ColumnKind::Other,
            nullable: true,
            default: None,
            auto_increment: false,
            primary_key: false,
            unique: false,
        };

        loop {
            if self.eat_keyword("UNSIGNED") {
                unsigned = true;
            } else if self.eat_keyword("SIGNED") || self.eat_keyword("ZEROFILL") {
            } else if self.eat_keyword("NOT") {
                self.expect_keyword("NULL")?;
                column.nullable = false;
            } else if self.eat_keyword("NULL") {
                column.nullable = true;
            } else if self.eat_keyword("DEFAULT") {
                column.default = Some(self.default_value()?);
            } else if self.eat_keyword("AUTO_INCREMENT") {
                column.auto_increment = true;
            } else if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                column.primary_key = true;
            } else if self.eat_keyword("KEY") {
                column.primary_key = true;
            } else if self.eat_keyword("UNIQUE") {
                self.eat_keyword("KEY");
                column.unique = true;
            } else if self.eat_keyword("CHARACTER") {
                self.expect_keyword("SET")?;
                self.identifier()?;
            } else if self.eat_keyword("CHARSET") || self.eat_keyword("COLLATE") {
                self.identifier()?;
            } else if self.eat_keyword("COMMENT") {
                match self.advance().kind {
                    TokenKind::Str(_) => {}
                    _ => return Err(self.error()),
                }
            } else if self.eat_keyword("ON") {
                self.expect_keyword("UPDATE")?;
                self.current_timestamp()?;
            } else {
                break;
            }
        }

        if column.primary_key {
            column.nullable = false;
        }
        column.kind = ColumnKind::classify(&type_name, unsigned);
        column.definition = self.source[start..self.previous_end()].to_string();
        Ok(column)
    }

    fn current_timestamp(&mut self) -> ParseResult<()> {
        if self.eat_keyword("CURRENT_TIMESTAMP") || self.eat_keyword("NOW") {
            if self.eat(&TokenKind::LeftParen) {
                self.expect(&TokenKind::RightParen)?;
            }
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn default_value(&mut self) -> ParseResult<ColumnDefault> {
        if self.at_keyword("CURRENT_TIMESTAMP") || self.at_keyword("NOW") {
            self.current_timestamp()?;
            return Ok(ColumnDefault::CurrentTimestamp);
        }
        self.literal().map(ColumnDefault::Value)
    }

    fn literal(&mut self) -> ParseResult<SqlValue> {
        let negative = self.eat(&TokenKind::Minus);
        let value = match self.peek().kind.clone() {
            TokenKind::Integer(n) => SqlValue::Int(if negative { -n } else { n }),
            TokenKind::Float(f) => SqlValue::Float(if negative { -f } else { f }),
            _ if negative => return Err(self.error()),
            TokenKind::Str(s) => SqlValue::Text(s),
            TokenKind::Word(w) if w.eq_ignore_ascii_case("NULL") => SqlValue::Null,
            TokenKind::Word(w) if w.eq_ignore_ascii_case("TRUE") => SqlValue::Int(1),
            TokenKind::Word(w) if w.eq_ignore_ascii_case("FALSE") => SqlValue::Int(0),
            _ => return Err(self.error()),
        };
        self.advance();
        Ok(value)
    }

    fn expr(&mut self) -> ParseResult<Expr> {
        if self.eat(&TokenKind::Question) {
            let index = self.params;
            self.params += 1;
            return Ok(Expr::Param(index));
        }
        self.literal().map(Expr::Value)
    }

    fn position(&mut self) -> ParseResult<Position> {
        if self.eat_keyword("FIRST") {
            Ok(Position::First)
        } else if self.eat_keyword("AFTER") {
            Ok(Position::After(self.identifier()?))
        } else {
            Ok(Position::Unchanged)
        }
    }

    fn drop_table(&mut self) -> ParseResult<Statement> {
        self.expect_keyword("TABLE")?;
        let if_exists = if self.eat_keyword("IF") {
            self.expect_keyword("EXISTS")?;
            true
        } else {
            false
        };
        let mut tables = vec![self.identifier()?];
        while self.eat(&TokenKind::Comma) {
            tables.push(self.identifier()?);
        }
        Ok(Statement::DropTable { tables, if_exists })
    }

    fn alter_table(&mut self) -> ParseResult<Statement> {
        self.eat_keyword("IGNORE");
        self.expect_keyword("TABLE")?;
        let table = self.identifier()?;
        let mut actions = vec![self.alter_action()?];
        while self.eat(&TokenKind::Comma) {
            actions.push(self.alter_action()?);
        }
        Ok(Statement::AlterTable { table, actions })
    }

    fn alter_action(&mut self) -> ParseResult<AlterAction> {
        if self.eat_keyword("ADD") {
            if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                return Ok(AlterAction::AddKey(self.key_def(KeyKind::Primary)?));
            }
            if self.eat_keyword("UNIQUE") {
                if !self.eat_keyword("INDEX") {
                    self.eat_keyword("KEY");
                }
                return Ok(AlterAction::AddKey(self.key_def(KeyKind::Unique)?));
            }
            if self.eat_keyword("INDEX") || self.eat_keyword("KEY") {
                return Ok(AlterAction::AddKey(self.key_def(KeyKind::Index)?));
            }
            self.eat_keyword("COLUMN");
            let name = self.identifier()?;
            let column = self.column_def(name)?;
            let position = self.position()?;
            return Ok(AlterAction::AddColumn { column, position });
        }

        if self.eat_keyword("CHANGE") {
            self.eat_keyword("COLUMN");
            let from = self.identifier()?;
            let name = self.identifier()?;
            let column = self.column_def(name)?;
            let position = self.position()?;
            return Ok(AlterAction::ChangeColumn {
                from,
                column,
                position,
            });
        }

        Err(self.error())
    }

    fn insert(&mut self, mode: InsertMode) -> ParseResult<Statement> {
        self.eat_keyword("INTO");
        let table = self.identifier()?;

        let columns = if self.eat(&TokenKind::LeftParen) {
            let mut names = vec![self.column_ref()?];
            while self.eat(&TokenKind::Comma) {
                names.push(self.column_ref()?);
            }
            self.expect(&TokenKind::RightParen)?;
            Some(names)
        } else {
            None
        };

        if !self.eat_keyword("VALUES") {
            self.expect_keyword("VALUE")?;
        }
        let mut rows = Vec::new();
        loop {
            self.expect(&TokenKind::LeftParen)?;
            let mut row = Vec::new();
            if !self.at(&TokenKind::RightParen) {
                row.push(self.expr()?);
                while self.eat(&TokenKind::Comma) {
                    row.push(self.expr()?);
                }
            }
            self.expect(&TokenKind::RightParen)?;
            rows.push(row);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        Ok(Statement::Insert {
            mode,
            table,
            columns,
            rows,
        })
    }

    fn update(&mut self) -> ParseResult<Statement> {
        let ignore = self.eat_keyword("IGNORE");
        let table = self.identifier()?;
        self.expect_keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.column_ref()?;
            self.expect(&TokenKind::Eq)?;
            assignments.push((column, self.expr()?));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let filter = self.filter()?;
        Ok(Statement::Update {
            table,
            ignore,
            assignments,
            filter,
        })
    }

    fn delete(&mut self) -> ParseResult<Statement> {
        self.expect_keyword("FROM")?;
        let table = self.identifier()?;
        let filter = self.filter()?;
        Ok(Statement::Delete { table, filter })
    }

    fn select(&mut self) -> ParseResult<Statement> {
        let projection = if self.eat(&TokenKind::Star) {
            Projection::All
        } else {
            let mut columns = vec![self.column_ref()?];
            while self.eat(&TokenKind::Comma) {
                columns.push(self.column_ref()?);
            }
            Projection::Columns(columns)
        };

        self.expect_keyword("FROM")?;
        let table = self.identifier()?;
        let filter = self.filter()?;

        let order = if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let column = self.column_ref()?;
            let descending = self.eat_keyword("DESC");
            if !descending {
                self.eat_keyword("ASC");
            }
            Some(Order { column, descending })
        } else {
            None
        };

        let limit = if self.eat_keyword("LIMIT") {
            match self.advance().kind {
                TokenKind::Integer(n) => usize::try_from(n).ok(),
                _ => return Err(self.error()),
            }
        } else {
            None
        };

        Ok(Statement::Select {
            projection,
            table,
            filter,
            order,
            limit,
        })
    }

    fn filter(&mut self) -> ParseResult<Vec<Condition>> {
        let mut conditions = Vec::new();
        if !self.eat_keyword("WHERE") {
            return Ok(conditions);
        }
        loop {
            let column = self.column_ref()?;
            if self.eat_keyword("IS") {
                let negated = self.eat_keyword("NOT");
                self.expect_keyword("NULL")?;
                conditions.push(Condition::IsNull { column, negated });
            } else {
                self.expect(&TokenKind::Eq)?;
                conditions.push(Condition::Eq(column, self.expr()?));
            }
            if !self.eat_keyword("AND") {
                break;
            }
        }
        Ok(conditions)
    }
}
