//! Migration executor.
//!
//! Applies migrations one statement at a time, in order. A store error whose
//! code is in the migration's ignorable set counts as success; any other
//! error aborts the sequence and is returned with the failing statement.

use schemata_core::migration::BATCH_INSERT_PLACEHOLDER;
use schemata_core::value::quote_identifier;
use schemata_core::{BatchInsert, ErrorCode, Migration};
use tracing::{debug, warn};

use crate::error::{Result, StoreError, UpdaterError};
use crate::store::SchemaStore;

/// What happened to one migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The statement ran.
    Applied {
        /// Rows affected.
        affected: u64,
    },
    /// The store reported an error the migration tolerates.
    Ignored {
        /// The tolerated error code.
        code: ErrorCode,
    },
    /// Dry run: the statement was printed, not executed.
    Planned,
}

/// Totals for a sequence of migrations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Outcome of each migration, in order.
    pub outcomes: Vec<MigrationOutcome>,
}

impl ExecutionReport {
    /// Number of migrations that ran.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MigrationOutcome::Applied { .. }))
            .count()
    }

    /// Number of migrations whose error was ignored.
    #[must_use]
    pub fn ignored(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MigrationOutcome::Ignored { .. }))
            .count()
    }

    /// Total rows affected.
    #[must_use]
    pub fn affected(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                MigrationOutcome::Applied { affected } => *affected,
                _ => 0,
            })
            .sum()
    }
}

/// Executes migrations against a store.
pub struct MigrationExecutor<S: SchemaStore> {
    store: S,
    dry_run: bool,
}

impl<S: SchemaStore> MigrationExecutor<S> {
    /// Creates a new migration executor.
    pub const fn new(store: S) -> Self {
        Self {
            store,
            dry_run: false,
        }
    }

    /// Enables dry-run mode (statements are printed but not executed).
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns whether dry-run mode is on.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Returns the store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Applies a single migration.
    pub async fn execute(&self, migration: &Migration) -> Result<MigrationOutcome> {
        if self.dry_run {
            println!("{migration}");
            return Ok(MigrationOutcome::Planned);
        }

        match migration {
            Migration::BatchInsert(batch) => self
                .execute_batch(batch)
                .await
                .map(|affected| MigrationOutcome::Applied { affected }),
            _ => self.execute_statement(migration).await,
        }
    }

    /// Applies migrations in order, stopping at the first error that is not
    /// ignorable. Earlier migrations stay applied.
    pub async fn execute_all(&self, migrations: &[Migration]) -> Result<ExecutionReport> {
        match self.execute_until_error(migrations).await {
            (report, None) => Ok(report),
            (_, Some(error)) => Err(error),
        }
    }

    /// Like [`execute_all`](Self::execute_all), but also hands back the
    /// outcomes recorded before the failing migration.
    pub async fn execute_until_error(
        &self,
        migrations: &[Migration],
    ) -> (ExecutionReport, Option<UpdaterError>) {
        let mut report = ExecutionReport::default();
        for migration in migrations {
            match self.execute(migration).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(error) => return (report, Some(error)),
            }
        }
        (report, None)
    }

    async fn execute_statement(&self, migration: &Migration) -> Result<MigrationOutcome> {
        let statement = migration.render();
        debug!(kind = migration.kind(), statement, "Executing migration");

        match self.store.execute(statement, migration.binds()).await {
            Ok(affected) => Ok(MigrationOutcome::Applied { affected }),
            Err(error) => match error.code() {
                Some(code) if migration.is_ignorable(code) => {
                    warn!(
                        code = %code,
                        statement,
                        error = %error,
                        "Ignoring error, change already in place"
                    );
                    Ok(MigrationOutcome::Ignored { code })
                }
                _ => Err(UpdaterError::MigrationFailed {
                    statement: statement.to_string(),
                    source: error,
                }),
            },
        }
    }

    async fn execute_batch(&self, batch: &BatchInsert) -> Result<u64> {
        if self.store.supports_bulk_load() {
            match self.try_bulk_load(batch).await {
                Ok(affected) => return Ok(affected),
                Err(error) if batch.surfaces_bulk_errors() => {
                    return Err(UpdaterError::MigrationFailed {
                        statement: format!(
                            "{BATCH_INSERT_PLACEHOLDER} into {}",
                            quote_identifier(batch.table())
                        ),
                        source: error,
                    });
                }
                Err(error) => {
                    warn!(
                        table = batch.table(),
                        error = %error,
                        "Bulk load failed, falling back to row-by-row inserts"
                    );
                }
            }
        }
        self.try_row_by_row(batch).await
    }

    async fn try_bulk_load(&self, batch: &BatchInsert) -> std::result::Result<u64, StoreError> {
        debug!(
            table = batch.table(),
            rows = batch.rows().len(),
            "Bulk loading rows"
        );
        self.store.bulk_load(batch).await
    }

    async fn try_row_by_row(&self, batch: &BatchInsert) -> Result<u64> {
        let statement = batch.row_statement();
        debug!(
            table = batch.table(),
            rows = batch.rows().len(),
            statement = %statement,
            "Inserting rows one by one"
        );

        let mut affected = 0;
        for row in batch.rows() {
            affected += self
                .store
                .execute(&statement, row)
                .await
                .map_err(|source| UpdaterError::MigrationFailed {
                    statement: statement.clone(),
                    source,
                })?;
        }
        Ok(affected)
    }
}
