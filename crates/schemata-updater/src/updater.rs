//! Update orchestration.
//!
//! The [`Updater`] finds, per component, the registered units newer than the
//! recorded version, applies each unit's migrations and records the unit's
//! version once it completes.

use schemata_core::{Migration, MigrationFactory, SchemaVersion};
use tracing::{error, info, warn};

use crate::error::{Result, UpdaterError};
use crate::executor::{ExecutionReport, MigrationExecutor};
use crate::history::VersionStore;
use crate::store::SchemaStore;
use crate::updates::{FailurePolicy, RegisteredUpdate, UpdateContext, UpdatesRegistry};

/// Whether one component's failure stops the remaining components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopPolicy {
    /// Keep updating the other components and collect failures.
    #[default]
    Isolated,
    /// Stop at the first failing component.
    Strict,
}

/// How a unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    /// All migrations ran or were ignored.
    Applied,
    /// A migration failed and the unit's policy suppressed it.
    Suppressed,
    /// Dry run: statements were printed.
    Planned,
}

/// Result of one unit.
#[derive(Debug, Clone)]
pub struct UnitReport {
    /// Unit version.
    pub version: SchemaVersion,
    /// How the unit ended.
    pub status: UnitStatus,
    /// Per-migration outcomes (empty when suppressed).
    pub execution: ExecutionReport,
    /// The suppressed error, if any.
    pub error: Option<String>,
}

/// Result of updating one component.
#[derive(Debug, Clone)]
pub struct ComponentReport {
    /// Component name.
    pub component: String,
    /// Version recorded before the update.
    pub from: Option<SchemaVersion>,
    /// Units run, in order.
    pub units: Vec<UnitReport>,
}

impl ComponentReport {
    /// Version the component is at after the update.
    #[must_use]
    pub fn to_version(&self) -> Option<&SchemaVersion> {
        self.units
            .last()
            .map(|unit| &unit.version)
            .or(self.from.as_ref())
    }

    /// Returns true if there was nothing to do.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.units.is_empty()
    }
}

/// Result of updating every component.
#[derive(Debug, Default)]
pub struct UpdateSummary {
    /// Components that completed.
    pub components: Vec<ComponentReport>,
    /// Failures of the other components.
    pub failures: Vec<UpdaterError>,
}

impl UpdateSummary {
    /// Returns true if no component failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Converts the summary into the completed reports, or the failures.
    pub fn into_result(mut self) -> Result<Vec<ComponentReport>> {
        match self.failures.len() {
            0 => Ok(self.components),
            1 => Err(self.failures.remove(0)),
            _ => Err(UpdaterError::Multiple(self.failures)),
        }
    }
}

/// Applies registered units to a store.
pub struct Updater<S: SchemaStore, V: VersionStore> {
    registry: UpdatesRegistry,
    factory: MigrationFactory,
    executor: MigrationExecutor<S>,
    versions: V,
}

impl<S: SchemaStore, V: VersionStore> Updater<S, V> {
    /// Creates an updater.
    pub fn new(
        registry: UpdatesRegistry,
        factory: MigrationFactory,
        store: S,
        versions: V,
    ) -> Self {
        Self {
            registry,
            factory,
            executor: MigrationExecutor::new(store),
            versions,
        }
    }

    /// Enables dry-run mode: statements are printed, nothing is executed or
    /// recorded.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.executor = self.executor.dry_run(enabled);
        self
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &UpdatesRegistry {
        &self.registry
    }

    /// Returns the migration factory.
    #[must_use]
    pub const fn factory(&self) -> &MigrationFactory {
        &self.factory
    }

    /// Returns the version store.
    #[must_use]
    pub const fn versions(&self) -> &V {
        &self.versions
    }

    /// Returns the schema store.
    #[must_use]
    pub const fn store(&self) -> &S {
        self.executor.store()
    }

    /// Prepares version storage.
    pub async fn init(&self) -> Result<()> {
        if self.executor.is_dry_run() {
            return Ok(());
        }
        self.versions.init().await
    }

    /// Returns the units of `component` newer than its recorded version.
    pub async fn pending(&self, component: &str) -> Result<Vec<&RegisteredUpdate>> {
        let from = self.versions.applied_version(component).await?;
        self.units_after(component, from.as_ref())
    }

    /// Builds the migrations of every pending unit of `component` without
    /// executing them.
    pub async fn pending_migrations(
        &self,
        component: &str,
    ) -> Result<Vec<(SchemaVersion, Vec<Migration>)>> {
        let context = UpdateContext::new(&self.factory, self.executor.store());
        let mut planned = Vec::new();
        for update in self.pending(component).await? {
            let migrations = update.unit().migrations(&context).await?;
            planned.push((update.version().clone(), migrations));
        }
        Ok(planned)
    }

    /// Applies the pending units of `component` in version order.
    ///
    /// A unit with [`FailurePolicy::Propagate`] that fails stops the
    /// component; units before it stay applied and recorded.
    pub async fn update_component(&self, component: &str) -> Result<ComponentReport> {
        let from = self.versions.applied_version(component).await?;
        let pending = self.units_after(component, from.as_ref())?;

        info!(
            component,
            from = from.as_ref().map_or("none", SchemaVersion::as_str),
            pending = pending.len(),
            "Updating component"
        );
        if !pending.is_empty() {
            self.init().await?;
        }

        let mut units = Vec::with_capacity(pending.len());
        for update in pending {
            units.push(self.apply_update(component, update).await?);
        }

        Ok(ComponentReport {
            component: component.to_string(),
            from,
            units,
        })
    }

    /// Updates every registered component, `core` first.
    ///
    /// With [`StopPolicy::Strict`] the first failure is returned; otherwise
    /// failures are collected in the summary.
    pub async fn update_all(&self, policy: StopPolicy) -> Result<UpdateSummary> {
        let mut summary = UpdateSummary::default();
        for component in self.registry.components() {
            match self.update_component(component).await {
                Ok(report) => summary.components.push(report),
                Err(e) if policy == StopPolicy::Strict => return Err(e),
                Err(e) => {
                    warn!(component, error = %e, "Component update failed, continuing");
                    summary.failures.push(e);
                }
            }
        }
        Ok(summary)
    }

    fn units_after(
        &self,
        component: &str,
        from: Option<&SchemaVersion>,
    ) -> Result<Vec<&RegisteredUpdate>> {
        let units = self
            .registry
            .units(component)
            .ok_or_else(|| UpdaterError::UnknownComponent(component.to_string()))?;
        Ok(units
            .iter()
            .filter(|update| from.is_none_or(|from| update.version() > from))
            .collect())
    }

    async fn apply_update(&self, component: &str, update: &RegisteredUpdate) -> Result<UnitReport> {
        let version = update.version();
        info!(component, version = %version, "Applying update");

        match self.run_update(update).await {
            (execution, None) => {
                self.record(component, version).await?;
                info!(
                    component,
                    version = %version,
                    applied = execution.applied(),
                    ignored = execution.ignored(),
                    "Update applied"
                );
                let status = if self.executor.is_dry_run() {
                    UnitStatus::Planned
                } else {
                    UnitStatus::Applied
                };
                Ok(UnitReport {
                    version: version.clone(),
                    status,
                    execution,
                    error: None,
                })
            }
            (execution, Some(e)) => match update.unit().failure_policy() {
                FailurePolicy::Suppress => {
                    warn!(
                        component,
                        version = %version,
                        error = %e,
                        "Update failed, suppressed by its failure policy"
                    );
                    self.record(component, version).await?;
                    Ok(UnitReport {
                        version: version.clone(),
                        status: UnitStatus::Suppressed,
                        execution,
                        error: Some(e.to_string()),
                    })
                }
                FailurePolicy::Propagate => {
                    error!(component, version = %version, error = %e, "Update failed");
                    Err(UpdaterError::UnitFailed {
                        component: component.to_string(),
                        version: version.to_string(),
                        source: Box::new(e),
                    })
                }
            },
        }
    }

    /// Runs the unit's migrations; on failure the outcomes recorded so far
    /// come back alongside the error.
    async fn run_update(
        &self,
        update: &RegisteredUpdate,
    ) -> (ExecutionReport, Option<UpdaterError>) {
        let context = UpdateContext::new(&self.factory, self.executor.store());
        match update.unit().migrations(&context).await {
            Ok(migrations) => self.executor.execute_until_error(&migrations).await,
            Err(e) => (ExecutionReport::default(), Some(e)),
        }
    }

    async fn record(&self, component: &str, version: &SchemaVersion) -> Result<()> {
        if self.executor.is_dry_run() {
            return Ok(());
        }
        self.versions.set_applied_version(component, version).await
    }
}
