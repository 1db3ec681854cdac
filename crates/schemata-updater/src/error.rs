//! Error types for applying migrations.

use schemata_core::{ErrorCode, VersionError};

/// An error reported by the schema store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The engine rejected a statement and reported a code.
    #[error("[{code}] {message}")]
    Database {
        /// Engine error code.
        code: ErrorCode,
        /// Engine message.
        message: String,
    },

    /// The store could not be reached or the session broke.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store does not offer the requested capability.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A local file the store needed could not be written or read.
    #[error("IO error: {0}")]
    Io(String),
}

impl StoreError {
    /// Creates a database error.
    pub fn database(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self::Database {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns the engine code. Errors without one are never ignorable.
    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Database { code, .. } => Some(*code),
            Self::Connection(_) | Self::Unsupported(_) | Self::Io(_) => None,
        }
    }
}

/// Errors that can occur while updating a schema.
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    /// A migration failed with an error it does not tolerate.
    #[error("Migration failed: {statement}: {source}")]
    MigrationFailed {
        /// The statement that failed.
        statement: String,
        /// The store error.
        #[source]
        source: StoreError,
    },

    /// An Updates unit failed; earlier migrations of the unit stay applied.
    #[error("Update {component}@{version} failed: {source}")]
    UnitFailed {
        /// Component the unit belongs to.
        component: String,
        /// Version of the unit.
        version: String,
        /// Cause.
        #[source]
        source: Box<UpdaterError>,
    },

    /// A store error outside migration execution.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid version string.
    #[error("Invalid version: {0}")]
    Version(#[from] VersionError),

    /// No updates are registered for the component.
    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pattern used by an Updates unit failed to compile.
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database driver error (connecting, pooling).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Multiple errors occurred.
    #[error("Multiple errors occurred:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<UpdaterError>),
}

impl UpdaterError {
    /// Returns the store error code at the root of this error, if any.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::MigrationFailed { source, .. } => source.code(),
            Self::Store(e) => e.code(),
            Self::UnitFailed { source, .. } => source.code(),
            _ => None,
        }
    }

    /// Returns the failing statement, if the error came from a migration.
    #[must_use]
    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::MigrationFailed { statement, .. } => Some(statement),
            Self::UnitFailed { source, .. } => source.statement(),
            _ => None,
        }
    }
}

/// Result type for updater operations.
pub type Result<T> = std::result::Result<T, UpdaterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_code() {
        let err = StoreError::database(1060u16, "Duplicate column name 'c'");
        assert_eq!(err.code(), Some(ErrorCode(1060)));
        assert_eq!(err.to_string(), "[1060] Duplicate column name 'c'");
        assert_eq!(StoreError::Connection("gone".into()).code(), None);
        assert_eq!(StoreError::Io("denied".into()).code(), None);
    }

    #[test]
    fn test_unit_failure_keeps_statement() {
        let err = UpdaterError::UnitFailed {
            component: "core".into(),
            version: "2.0-a7".into(),
            source: Box::new(UpdaterError::MigrationFailed {
                statement: "ALTER TABLE `t` ADD COLUMN `c` INT".into(),
                source: StoreError::database(1146u16, "Table 't' doesn't exist"),
            }),
        };
        assert_eq!(err.statement(), Some("ALTER TABLE `t` ADD COLUMN `c` INT"));
        assert_eq!(err.code(), Some(ErrorCode(1146)));
        assert!(err.to_string().starts_with("Update core@2.0-a7 failed"));
    }
}
