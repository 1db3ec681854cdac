//! Engine error codes and the table mapping schema-state errors to them.
//!
//! A migration decides at construction time which errors mean "the intended
//! end state already holds". Those decisions are expressed as [`ErrorKind`]s
//! and resolved to concrete engine codes through an [`ErrorCodes`] table, so
//! the same migration logic can be keyed to a different engine by swapping
//! the table.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A numeric error code reported by the schema store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    /// Returns the raw code.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for ErrorCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

/// Schema-state error classes that a migration may declare ignorable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The table to create already exists.
    TableExists,
    /// The table to drop is unknown.
    UnknownTable,
    /// A referenced column does not exist.
    UnknownColumn,
    /// The column to add already exists.
    DuplicateColumn,
    /// The index name is already taken.
    DuplicateKey,
    /// The row violates a unique key.
    DuplicateEntry,
    /// A column named in an index does not exist.
    KeyColumnNotExists,
    /// The referenced table does not exist.
    TableNotExists,
}

/// Maps each [`ErrorKind`] to the code the store reports for it.
///
/// The default table holds MySQL server error numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCodes {
    /// `ER_TABLE_EXISTS_ERROR`.
    pub table_exists: ErrorCode,
    /// `ER_BAD_TABLE_ERROR`.
    pub unknown_table: ErrorCode,
    /// `ER_BAD_FIELD_ERROR`.
    pub unknown_column: ErrorCode,
    /// `ER_DUP_FIELDNAME`.
    pub duplicate_column: ErrorCode,
    /// `ER_DUP_KEYNAME`.
    pub duplicate_key: ErrorCode,
    /// `ER_DUP_ENTRY`.
    pub duplicate_entry: ErrorCode,
    /// `ER_KEY_COLUMN_DOES_NOT_EXITS`.
    pub key_column_not_exists: ErrorCode,
    /// `ER_NO_SUCH_TABLE`.
    pub table_not_exists: ErrorCode,
}

impl ErrorCodes {
    /// MySQL-compatible codes.
    #[must_use]
    pub const fn mysql() -> Self {
        Self {
            table_exists: ErrorCode(1050),
            unknown_table: ErrorCode(1051),
            unknown_column: ErrorCode(1054),
            duplicate_column: ErrorCode(1060),
            duplicate_key: ErrorCode(1061),
            duplicate_entry: ErrorCode(1062),
            key_column_not_exists: ErrorCode(1072),
            table_not_exists: ErrorCode(1146),
        }
    }

    /// Returns the code for an error kind.
    #[must_use]
    pub const fn code(&self, kind: ErrorKind) -> ErrorCode {
        match kind {
            ErrorKind::TableExists => self.table_exists,
            ErrorKind::UnknownTable => self.unknown_table,
            ErrorKind::UnknownColumn => self.unknown_column,
            ErrorKind::DuplicateColumn => self.duplicate_column,
            ErrorKind::DuplicateKey => self.duplicate_key,
            ErrorKind::DuplicateEntry => self.duplicate_entry,
            ErrorKind::KeyColumnNotExists => self.key_column_not_exists,
            ErrorKind::TableNotExists => self.table_not_exists,
        }
    }

    /// Resolves a list of kinds to an ignorable set.
    #[must_use]
    pub fn resolve(&self, kinds: &[ErrorKind]) -> IgnoredErrors {
        IgnoredErrors(kinds.iter().map(|kind| self.code(*kind)).collect())
    }

    /// Reverse lookup, for diagnostics.
    #[must_use]
    pub fn kind_of(&self, code: ErrorCode) -> Option<ErrorKind> {
        [
            ErrorKind::TableExists,
            ErrorKind::UnknownTable,
            ErrorKind::UnknownColumn,
            ErrorKind::DuplicateColumn,
            ErrorKind::DuplicateKey,
            ErrorKind::DuplicateEntry,
            ErrorKind::KeyColumnNotExists,
            ErrorKind::TableNotExists,
        ]
        .into_iter()
        .find(|kind| self.code(*kind) == code)
    }
}

impl Default for ErrorCodes {
    fn default() -> Self {
        Self::mysql()
    }
}

/// The fixed set of codes a migration treats as success-equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IgnoredErrors(BTreeSet<ErrorCode>);

impl IgnoredErrors {
    /// No error is ignorable.
    #[must_use]
    pub const fn none() -> Self {
        Self(BTreeSet::new())
    }

    /// Returns whether `code` is ignorable.
    #[must_use]
    pub fn contains(&self, code: ErrorCode) -> bool {
        self.0.contains(&code)
    }

    /// Returns true if nothing is ignorable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of ignorable codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates the codes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ErrorCode> + '_ {
        self.0.iter().copied()
    }
}

impl From<ErrorCode> for IgnoredErrors {
    fn from(code: ErrorCode) -> Self {
        Self(BTreeSet::from([code]))
    }
}

impl From<u16> for IgnoredErrors {
    fn from(code: u16) -> Self {
        Self::from(ErrorCode(code))
    }
}

impl<const N: usize> From<[u16; N]> for IgnoredErrors {
    fn from(codes: [u16; N]) -> Self {
        Self(codes.into_iter().map(ErrorCode).collect())
    }
}

impl From<Vec<ErrorCode>> for IgnoredErrors {
    fn from(codes: Vec<ErrorCode>) -> Self {
        Self(codes.into_iter().collect())
    }
}

impl FromIterator<ErrorCode> for IgnoredErrors {
    fn from_iter<I: IntoIterator<Item = ErrorCode>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
