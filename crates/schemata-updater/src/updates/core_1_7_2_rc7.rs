//! Core 1.7.2-rc7: dashboard names and layout cleanup.

use async_trait::async_trait;
use regex::{Captures, Regex};
use schemata_core::value::quote_identifier;
use schemata_core::{IgnoredErrors, Migration, SqlValue};

use super::{FailurePolicy, UpdateContext, Updates};
use crate::error::Result;

const ENTITY_PATTERN: &str = r"&(?:#([0-9]+)|#[xX]([0-9a-fA-F]+)|([A-Za-z][A-Za-z0-9]*));";

fn named_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

/// Adds `user_dashboard.name` and rewrites every stored layout.
///
/// Layouts were saved HTML-escaped with backslash-escaped quotes; each one
/// is decoded and written back with its own bound UPDATE. Failures are
/// suppressed: the dashboard table may predate or postdate this shape.
#[derive(Debug, Clone)]
pub struct DashboardNames {
    entity: Regex,
}

impl DashboardNames {
    /// Creates the unit.
    pub fn new() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            entity: Regex::new(ENTITY_PATTERN)?,
        })
    }

    /// Decodes HTML entities, then turns `\"` into `"`.
    ///
    /// Single quotes stay encoded, like a double-quote-only entity decoder.
    #[must_use]
    pub fn decode_layout(&self, layout: &str) -> String {
        let decoded = self.entity.replace_all(layout, |caps: &Captures<'_>| {
            let character = if let Some(decimal) = caps.get(1) {
                decimal.as_str().parse::<u32>().ok().and_then(char::from_u32)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
            } else {
                caps.get(3).and_then(|name| named_entity(name.as_str()))
            };
            match character {
                Some('\'') | None => caps[0].to_string(),
                Some(c) => c.to_string(),
            }
        });
        decoded.replace("\\\"", "\"")
    }
}

#[async_trait]
impl Updates for DashboardNames {
    fn version(&self) -> &str {
        "1.7.2-rc7"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Suppress
    }

    async fn migrations(&self, context: &UpdateContext<'_>) -> Result<Vec<Migration>> {
        let factory = context.factory();
        let mut migrations = vec![factory.add_column(
            "user_dashboard",
            "name",
            "VARCHAR( 100 ) NULL DEFAULT NULL",
            Some("iddashboard"),
        )];

        let table = quote_identifier(&factory.prefix_table("user_dashboard"));
        let dashboards = context
            .fetch_all(&format!("SELECT * FROM {table}"), &[])
            .await?;

        let update = format!("UPDATE {table} SET layout = ? WHERE iddashboard = ? AND login = ?");
        for dashboard in dashboards {
            let layout = self.decode_layout(dashboard.get_str("layout").unwrap_or_default());
            let id = dashboard.get("iddashboard").cloned().unwrap_or(SqlValue::Null);
            let login = dashboard.get("login").cloned().unwrap_or(SqlValue::Null);
            migrations.push(factory.bound_sql(
                update.clone(),
                vec![SqlValue::Text(layout), id, login],
                IgnoredErrors::none(),
            ));
        }

        Ok(migrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MigrationExecutor;
    use crate::memory::MemoryStore;
    use schemata_core::MigrationFactory;

    const ESCAPED: &str = r#"{&quot;config&quot;:{&quot;layout&quot;:&quot;33-33-33&quot;},&quot;title&quot;:&quot;a \&quot;b\&quot; &amp;lt;c&quot;}"#;

    #[test]
    fn test_decode_layout() {
        let unit = DashboardNames::new().unwrap();
        assert_eq!(
            unit.decode_layout(ESCAPED),
            r#"{"config":{"layout":"33-33-33"},"title":"a "b" &lt;c"}"#
        );
        assert_eq!(unit.decode_layout("&#60;&#x3E;&#x3e;"), "<>>");
        assert_eq!(unit.decode_layout("it&#039;s &unknown;"), "it&#039;s &unknown;");
        assert_eq!(unit.decode_layout("plain"), "plain");
    }

    async fn dashboard_store(factory: &MigrationFactory) -> MemoryStore {
        let store = MemoryStore::new();
        let executor = MigrationExecutor::new(store.clone());
        executor
            .execute_all(&[
                factory.create_table(
                    "user_dashboard",
                    [
                        ("login", "VARCHAR(100) NOT NULL"),
                        ("iddashboard", "INT(11) NOT NULL"),
                        ("layout", "TEXT NOT NULL"),
                    ],
                ),
                factory.insert(
                    "user_dashboard",
                    [
                        ("login", SqlValue::from("admin")),
                        ("iddashboard", SqlValue::Int(1)),
                        ("layout", SqlValue::from(ESCAPED)),
                    ],
                ),
                factory.insert(
                    "user_dashboard",
                    [
                        ("login", SqlValue::from("anna")),
                        ("iddashboard", SqlValue::Int(1)),
                        ("layout", SqlValue::from("[]")),
                    ],
                ),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_one_update_per_dashboard() {
        let factory = MigrationFactory::with_prefix("piwik_");
        let store = dashboard_store(&factory).await;
        let unit = DashboardNames::new().unwrap();

        let migrations = unit
            .migrations(&UpdateContext::new(&factory, &store))
            .await
            .unwrap();
        assert_eq!(migrations.len(), 3);
        assert_eq!(
            migrations[0].render(),
            "ALTER TABLE `piwik_user_dashboard` ADD COLUMN `name` VARCHAR( 100 ) NULL DEFAULT NULL AFTER `iddashboard`"
        );
        assert_eq!(
            migrations[1].render(),
            "UPDATE `piwik_user_dashboard` SET layout = ? WHERE iddashboard = ? AND login = ?"
        );
        assert_eq!(migrations[2].binds()[2], SqlValue::from("anna"));

        MigrationExecutor::new(store.clone())
            .execute_all(&migrations)
            .await
            .unwrap();
        assert_eq!(
            store.column_names("piwik_user_dashboard").unwrap(),
            vec!["login", "iddashboard", "name", "layout"]
        );
        let rows = store.rows("piwik_user_dashboard").unwrap();
        assert_eq!(
            rows[0].get_str("layout"),
            Some(r#"{"config":{"layout":"33-33-33"},"title":"a "b" &lt;c"}"#)
        );
        assert_eq!(rows[0].get("name"), Some(&SqlValue::Null));
        assert_eq!(rows[1].get_str("layout"), Some("[]"));
    }

    #[tokio::test]
    async fn test_missing_dashboard_table() {
        let factory = MigrationFactory::with_prefix("piwik_");
        let store = MemoryStore::new();
        let unit = DashboardNames::new().unwrap();

        let err = unit
            .migrations(&UpdateContext::new(&factory, &store))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(schemata_core::ErrorCode(1146)));
        assert_eq!(unit.failure_policy(), FailurePolicy::Suppress);
    }
}
