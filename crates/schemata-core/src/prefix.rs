//! Table-name prefixing.

/// Resolves a logical table name to its physical storage name.
///
/// The factory calls this exactly once per table-accepting operation; the
/// migrations it builds never prefix again.
pub trait TablePrefixer: Send + Sync {
    /// Returns the storage name for `table`.
    fn prefix_table(&self, table: &str) -> String;
}

/// Prepends a fixed string to every table name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TablePrefix {
    prefix: String,
}

impl TablePrefix {
    /// Creates a prefixer for `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the configured prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.prefix
    }
}

impl TablePrefixer for TablePrefix {
    fn prefix_table(&self, table: &str) -> String {
        format!("{}{}", self.prefix, table)
    }
}

impl<F> TablePrefixer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn prefix_table(&self, table: &str) -> String {
        self(table)
    }
}
