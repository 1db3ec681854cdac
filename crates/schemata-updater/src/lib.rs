//! Versioned schema updates for MySQL.
//!
//! `schemata-updater` applies the migrations built by `schemata-core`:
//! - Each migration runs as one statement; store errors listed in the
//!   migration's ignorable set count as "already in place"
//! - Updates units group migrations under a component and a version, and
//!   the recorded version decides which units are pending
//! - A unit's failure either stops its component or is suppressed, as the
//!   unit declares
//!
//! # Architecture
//!
//! - **Store** - [`SchemaStore`](store::SchemaStore), implemented for MySQL
//!   over sqlx and by an in-memory MySQL-compatible store
//! - **Executor** - Applies migrations in order, with ignorable errors and
//!   the batch-insert fallback
//! - **Version store** - Records the last applied version per component
//! - **Updater** - Finds pending units and applies them
//!
//! # Example
//!
//! ```rust
//! use schemata_updater::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let factory = MigrationFactory::with_prefix("piwik_");
//! let executor = MigrationExecutor::new(MemoryStore::new());
//!
//! let create = factory.create_table("option", [("option_name", "VARCHAR(255) NOT NULL")]);
//! executor.execute(&create).await?;
//!
//! // The table exists now; its "table exists" error is ignorable.
//! let outcome = executor.execute(&create).await?;
//! assert_eq!(outcome, MigrationOutcome::Ignored { code: ErrorCode(1050) });
//! # Ok::<(), UpdaterError>(())
//! # }).unwrap();
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show recorded versions
//! schemata --database mysql://root@localhost/piwik --prefix piwik_ status
//!
//! # Print the statements of pending updates
//! schemata sql
//!
//! # Apply pending updates, stopping at the first failing component
//! schemata update --strict
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod memory;
pub mod mysql;
pub mod store;
pub mod updater;
pub mod updates;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{BulkLoadConfig, UpdaterConfig};
    pub use crate::error::{Result, StoreError, UpdaterError};
    pub use crate::executor::{ExecutionReport, MigrationExecutor, MigrationOutcome};
    pub use crate::history::{AppliedVersion, TableVersionStore, VersionStore};
    pub use crate::memory::{BulkLoadMode, MemoryStore};
    pub use crate::mysql::MySqlStore;
    pub use crate::store::{Row, SchemaStore};
    pub use crate::updater::{
        ComponentReport, StopPolicy, UnitReport, UnitStatus, UpdateSummary, Updater,
    };
    pub use crate::updates::{
        FailurePolicy, RegisteredUpdate, UpdateContext, Updates, UpdatesRegistry,
    };
    pub use schemata_core::prelude::*;
}
