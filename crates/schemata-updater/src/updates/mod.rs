//! Versioned Updates units.
//!
//! A unit belongs to a component, carries a version and produces the
//! migrations that bring the component's schema up to that version. Units
//! are registered in an [`UpdatesRegistry`] and applied by the
//! [`Updater`](crate::updater::Updater) in version order.

mod core_1_7_2_rc7;
mod core_2_0_a7;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use schemata_core::{Migration, MigrationFactory, SchemaVersion, SqlValue};

use crate::error::{Result, UpdaterError};
use crate::store::{Row, SchemaStore};

pub use core_1_7_2_rc7::DashboardNames;
pub use core_2_0_a7::LoggerMessageLevels;

/// Component name of the bundled core units.
pub const CORE_COMPONENT: &str = "core";

/// What the updater does when a unit's migrations fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the component and return the error.
    #[default]
    Propagate,
    /// Log the failure, record the version anyway and continue.
    Suppress,
}

/// What a unit sees while building its migrations.
pub struct UpdateContext<'a> {
    factory: &'a MigrationFactory,
    store: &'a dyn SchemaStore,
}

impl<'a> UpdateContext<'a> {
    /// Creates a context.
    #[must_use]
    pub fn new(factory: &'a MigrationFactory, store: &'a dyn SchemaStore) -> Self {
        Self { factory, store }
    }

    /// Returns the migration factory.
    #[must_use]
    pub const fn factory(&self) -> &'a MigrationFactory {
        self.factory
    }

    /// Returns the store.
    #[must_use]
    pub const fn store(&self) -> &'a dyn SchemaStore {
        self.store
    }

    /// Reads rows through the store.
    pub async fn fetch_all(&self, statement: &str, binds: &[SqlValue]) -> Result<Vec<Row>> {
        Ok(self.store.fetch_all(statement, binds).await?)
    }
}

/// A versioned group of migrations.
#[async_trait]
pub trait Updates: Send + Sync {
    /// Version this unit brings its component to.
    fn version(&self) -> &str;

    /// Behaviour when one of the migrations fails.
    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Propagate
    }

    /// Builds the migrations, in execution order.
    async fn migrations(&self, context: &UpdateContext<'_>) -> Result<Vec<Migration>>;
}

/// A unit together with its parsed version.
#[derive(Clone)]
pub struct RegisteredUpdate {
    version: SchemaVersion,
    unit: Arc<dyn Updates>,
}

impl RegisteredUpdate {
    /// Returns the unit's version.
    #[must_use]
    pub const fn version(&self) -> &SchemaVersion {
        &self.version
    }

    /// Returns the unit.
    #[must_use]
    pub fn unit(&self) -> &dyn Updates {
        self.unit.as_ref()
    }
}

impl fmt::Debug for RegisteredUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredUpdate")
            .field("version", &self.version)
            .field("failure_policy", &self.unit.failure_policy())
            .finish()
    }
}

/// Units per component, each list sorted by version.
#[derive(Debug, Clone, Default)]
pub struct UpdatesRegistry {
    components: BTreeMap<String, Vec<RegisteredUpdate>>,
}

impl UpdatesRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the bundled core units.
    pub fn core() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(CORE_COMPONENT, DashboardNames::new()?)?;
        registry.register(CORE_COMPONENT, LoggerMessageLevels)?;
        Ok(registry)
    }

    /// Registers a unit for `component`.
    ///
    /// Fails if the version does not parse or is already registered.
    pub fn register(&mut self, component: &str, unit: impl Updates + 'static) -> Result<&mut Self> {
        let version = SchemaVersion::parse(unit.version())?;
        let units = self.components.entry(component.to_string()).or_default();
        if units.iter().any(|u| u.version == version) {
            return Err(UpdaterError::Config(format!(
                "update {component}@{version} is registered twice"
            )));
        }

        let position = units.partition_point(|u| u.version < version);
        units.insert(
            position,
            RegisteredUpdate {
                version,
                unit: Arc::new(unit),
            },
        );
        Ok(self)
    }

    /// Returns the registered component names: `core` first, then the
    /// others sorted by name.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        let core = self
            .components
            .get_key_value(CORE_COMPONENT)
            .map(|(name, _)| name.as_str());
        core.into_iter().chain(
            self.components
                .keys()
                .map(String::as_str)
                .filter(|name| *name != CORE_COMPONENT),
        )
    }

    /// Returns the units of `component` in version order.
    #[must_use]
    pub fn units(&self, component: &str) -> Option<&[RegisteredUpdate]> {
        self.components.get(component).map(Vec::as_slice)
    }

    /// Returns the highest registered version of `component`.
    #[must_use]
    pub fn latest_version(&self, component: &str) -> Option<&SchemaVersion> {
        self.units(component)
            .and_then(<[RegisteredUpdate]>::last)
            .map(RegisteredUpdate::version)
    }
}
