//! Updater configuration, read from an optional JSON file.

use std::path::{Path, PathBuf};

use schemata_core::{DbSettings, ErrorCodes, MigrationFactory, TablePrefix};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdaterError};

/// Bulk-load settings for batch inserts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkLoadConfig {
    /// Try `LOAD DATA INFILE` before row-by-row inserts.
    #[serde(default)]
    pub enabled: bool,

    /// Directory for staged data files; must be readable by the server.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Updater configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdaterConfig {
    /// MySQL connection URL.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Prefix prepended to every logical table name.
    #[serde(default)]
    pub table_prefix: String,

    /// Storage engine for created tables.
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Default charset for created tables.
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Bulk-load settings.
    #[serde(default)]
    pub bulk_load: BulkLoadConfig,
}

fn default_engine() -> String {
    DbSettings::default().engine
}

fn default_charset() -> String {
    DbSettings::default().charset
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            table_prefix: String::new(),
            engine: default_engine(),
            charset: default_charset(),
            bulk_load: BulkLoadConfig::default(),
        }
    }
}

impl UpdaterConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UpdaterError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, database_url: Option<String>, table_prefix: Option<String>) -> Self {
        if database_url.is_some() {
            self.database_url = database_url;
        }
        if let Some(prefix) = table_prefix {
            self.table_prefix = prefix;
        }
        self
    }

    /// Checks values that end up inside rendered statements.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("engine", &self.engine), ("charset", &self.charset)] {
            if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(UpdaterError::Config(format!(
                    "{name} must be a non-empty identifier, got '{value}'"
                )));
            }
        }
        if self.table_prefix.contains('`') {
            return Err(UpdaterError::Config(
                "table_prefix must not contain backticks".to_string(),
            ));
        }
        if self.bulk_load.enabled && self.bulk_load.directory.is_none() {
            return Err(UpdaterError::Config(
                "bulk_load.directory is required when bulk_load.enabled is set".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the connection URL or a configuration error.
    pub fn database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            UpdaterError::Config(
                "no database URL: pass --database, set SCHEMATA_DATABASE_URL or database_url"
                    .to_string(),
            )
        })
    }

    /// Returns the bulk-load directory when bulk loading is enabled.
    #[must_use]
    pub fn bulk_load_dir(&self) -> Option<&Path> {
        if self.bulk_load.enabled {
            self.bulk_load.directory.as_deref()
        } else {
            None
        }
    }

    /// Returns the table settings.
    #[must_use]
    pub fn db_settings(&self) -> DbSettings {
        DbSettings {
            engine: self.engine.clone(),
            charset: self.charset.clone(),
        }
    }

    /// Builds a migration factory with MySQL error codes.
    #[must_use]
    pub fn factory(&self) -> MigrationFactory {
        MigrationFactory::new(
            self.db_settings(),
            TablePrefix::new(self.table_prefix.clone()),
            ErrorCodes::mysql(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config: UpdaterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, UpdaterConfig::default());
        assert_eq!(config.engine, "InnoDB");
        assert_eq!(config.charset, "utf8");
        assert!(config.database_url().is_err());
        assert_eq!(config.bulk_load_dir(), None);
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "database_url": "mysql://root@localhost/piwik",
                "table_prefix": "piwik_",
                "charset": "utf8mb4",
                "bulk_load": {{ "enabled": true, "directory": "/var/lib/mysql-files" }}
            }}"#
        )
        .unwrap();

        let config = UpdaterConfig::load(file.path()).unwrap();
        assert_eq!(config.database_url().unwrap(), "mysql://root@localhost/piwik");
        assert_eq!(config.bulk_load_dir(), Some(Path::new("/var/lib/mysql-files")));

        let factory = config.factory();
        assert_eq!(factory.prefix_table("log_visit"), "piwik_log_visit");
        assert_eq!(factory.settings().charset, "utf8mb4");
        assert_eq!(factory.settings().engine, "InnoDB");
    }

    #[test]
    fn test_overrides() {
        let config = UpdaterConfig::default()
            .with_overrides(Some("mysql://db/matomo".into()), Some("matomo_".into()));
        assert_eq!(config.database_url().unwrap(), "mysql://db/matomo");
        assert_eq!(config.table_prefix, "matomo_");

        let kept = config.clone().with_overrides(None, None);
        assert_eq!(kept, config);
    }

    #[test]
    fn test_validation() {
        let config = UpdaterConfig {
            engine: "InnoDB; DROP".into(),
            ..UpdaterConfig::default()
        };
        assert!(matches!(config.validate(), Err(UpdaterError::Config(_))));

        let config = UpdaterConfig {
            bulk_load: BulkLoadConfig {
                enabled: true,
                directory: None,
            },
            ..UpdaterConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(serde_json::from_str::<UpdaterConfig>(r#"{"prefix": "x"}"#).is_err());
    }
}
