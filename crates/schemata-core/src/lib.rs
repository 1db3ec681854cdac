//! Declarative, idempotent schema migrations.
//!
//! `schemata-core` describes schema changes as values. A [`Migration`] renders
//! to exactly one statement and carries the set of store error codes that
//! mean "this change is already in place":
//! - Migrations are built by a [`MigrationFactory`], which prefixes table
//!   names once and decides each migration's ignorable errors
//! - Rendering is pure: nothing here touches a database
//! - Error classes are mapped to engine codes through [`ErrorCodes`], MySQL
//!   by default
//!
//! Applying migrations is the job of `schemata-updater`.
//!
//! # Example
//!
//! ```rust
//! use schemata_core::prelude::*;
//!
//! let factory = MigrationFactory::with_prefix("matomo_");
//!
//! let migrations = vec![
//!     factory.create_table("report", [("id", "INT(11) NOT NULL"), ("name", "VARCHAR(100)")]),
//!     factory.add_column("report", "owner", "VARCHAR(100) NULL", Some("name")),
//!     factory.add_index("report", ["owner", "name(10)"]),
//! ];
//!
//! assert_eq!(
//!     migrations[1].render(),
//!     "ALTER TABLE `matomo_report` ADD COLUMN `owner` VARCHAR(100) NULL AFTER `name`"
//! );
//! assert!(migrations[0].is_ignorable(ErrorCode(1050)));
//! ```

pub mod error_code;
pub mod factory;
pub mod migration;
pub mod prefix;
pub mod value;
pub mod version;

pub use error_code::{ErrorCode, ErrorCodes, ErrorKind, IgnoredErrors};
pub use factory::{DbSettings, IndexColumns, MigrationFactory};
pub use migration::{BatchInsert, Migration};
pub use prefix::{TablePrefix, TablePrefixer};
pub use value::SqlValue;
pub use version::{SchemaVersion, VersionError};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error_code::{ErrorCode, ErrorCodes, ErrorKind, IgnoredErrors};
    pub use crate::factory::{DbSettings, MigrationFactory};
    pub use crate::migration::{BatchInsert, Migration};
    pub use crate::prefix::{TablePrefix, TablePrefixer};
    pub use crate::value::SqlValue;
    pub use crate::version::SchemaVersion;
}
