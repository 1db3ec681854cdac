//! The bundled core updates applied through the updater.

use schemata_updater::prelude::*;

type MemoryUpdater = Updater<MemoryStore, TableVersionStore<MemoryStore>>;

fn updater(store: &MemoryStore) -> MemoryUpdater {
    let factory = MigrationFactory::with_prefix("piwik_");
    let versions = TableVersionStore::new(store.clone(), &factory);
    Updater::new(UpdatesRegistry::core().unwrap(), factory, store.clone(), versions)
}

async fn create_logger_message(store: &MemoryStore) {
    let factory = MigrationFactory::with_prefix("piwik_");
    MigrationExecutor::new(store.clone())
        .execute(&factory.create_table(
            "logger_message",
            [
                ("idlogger_message", "INTEGER UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY"),
                ("timestamp", "TIMESTAMP NULL"),
                ("message", "TEXT NULL"),
            ],
        ))
        .await
        .unwrap();
}

async fn install_schema(store: &MemoryStore) {
    let factory = MigrationFactory::with_prefix("piwik_");
    MigrationExecutor::new(store.clone())
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
                    ("layout", SqlValue::from("[[{&quot;uniqueId&quot;:&quot;widgetVisitsSummary&quot;}]]")),
                ],
            ),
        ])
        .await
        .unwrap();
    create_logger_message(store).await;
}

#[tokio::test]
async fn test_core_updates_apply_in_order() {
    let store = MemoryStore::new();
    install_schema(&store).await;
    let updater = updater(&store);

    let pending: Vec<String> = updater
        .pending("core")
        .await
        .unwrap()
        .iter()
        .map(|u| u.version().to_string())
        .collect();
    assert_eq!(pending, vec!["1.7.2-rc7", "2.0-a7"]);

    let summary = updater.update_all(StopPolicy::Strict).await.unwrap();
    let reports = summary.into_result().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].to_version().unwrap().as_str(), "2.0-a7");
    assert!(reports[0]
        .units
        .iter()
        .all(|unit| unit.status == UnitStatus::Applied));

    assert_eq!(
        store.column_names("piwik_user_dashboard").unwrap(),
        vec!["login", "iddashboard", "name", "layout"]
    );
    assert_eq!(
        store.rows("piwik_user_dashboard").unwrap()[0].get_str("layout"),
        Some(r#"[[{"uniqueId":"widgetVisitsSummary"}]]"#)
    );
    assert_eq!(
        store.column_names("piwik_logger_message").unwrap(),
        vec!["idlogger_message", "tag", "timestamp", "level", "message"]
    );

    let recorded = updater.versions().applied_versions().await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].component, "core");
    assert_eq!(recorded[0].version.as_str(), "2.0-a7");
    assert!(updater.pending("core").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rerun_after_lost_version_is_harmless() {
    let store = MemoryStore::new();
    install_schema(&store).await;
    updater(&store).update_component("core").await.unwrap();

    // Forget the recorded version: every schema change is already in place.
    store
        .execute("DELETE FROM `piwik_schema_version`", &[])
        .await
        .unwrap();
    let report = updater(&store).update_component("core").await.unwrap();
    assert_eq!(report.from, None);
    assert_eq!(report.units.len(), 2);
    assert!(report.units.iter().all(|unit| unit.status == UnitStatus::Applied));
    assert_eq!(report.units[1].execution.ignored(), 2);
    assert_eq!(
        store.column_names("piwik_logger_message").unwrap(),
        vec!["idlogger_message", "tag", "timestamp", "level", "message"]
    );
}

#[tokio::test]
async fn test_suppressed_then_propagated_failure() {
    let store = MemoryStore::new();
    let updater = updater(&store);

    // Neither table exists yet.
    let err = updater.update_component("core").await.unwrap_err();
    assert!(matches!(&err, UpdaterError::UnitFailed { version, .. } if version == "2.0-a7"));
    assert_eq!(err.code(), Some(ErrorCode(1146)));
    assert_eq!(
        updater.versions().applied_version("core").await.unwrap(),
        Some(SchemaVersion::parse("1.7.2-rc7").unwrap())
    );

    // Once the table is there the remaining unit applies.
    create_logger_message(&store).await;
    let report = updater.update_component("core").await.unwrap();
    assert_eq!(report.from.unwrap().as_str(), "1.7.2-rc7");
    assert_eq!(report.units.len(), 1);
    assert_eq!(report.units[0].version.as_str(), "2.0-a7");
}

#[tokio::test]
async fn test_sql_preview() {
    let store = MemoryStore::new();
    install_schema(&store).await;
    let updater = updater(&store);

    let planned = updater.pending_migrations("core").await.unwrap();
    let statements: Vec<String> = planned
        .iter()
        .flat_map(|(_, migrations)| migrations.iter().map(ToString::to_string))
        .collect();
    assert_eq!(
        statements,
        vec![
            "ALTER TABLE `piwik_user_dashboard` ADD COLUMN `name` VARCHAR( 100 ) NULL DEFAULT NULL AFTER `iddashboard`;",
            r#"UPDATE `piwik_user_dashboard` SET layout = '[[{\"uniqueId\":\"widgetVisitsSummary\"}]]' WHERE iddashboard = 1 AND login = 'admin';"#,
            "ALTER TABLE `piwik_logger_message` ADD COLUMN `tag` VARCHAR(50) NULL AFTER `idlogger_message`;",
            "ALTER TABLE `piwik_logger_message` ADD COLUMN `level` TINYINT AFTER `timestamp`;",
        ]
    );

    // Nothing was executed.
    assert_eq!(
        store.column_names("piwik_user_dashboard").unwrap(),
        vec!["login", "iddashboard", "layout"]
    );
}
