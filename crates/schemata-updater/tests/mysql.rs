//! Live MySQL checks. Set `SCHEMATA_TEST_MYSQL_URL` to run them.

use schemata_updater::prelude::*;

const URL_VAR: &str = "SCHEMATA_TEST_MYSQL_URL";

async fn connect() -> Option<MySqlStore> {
    let url = std::env::var(URL_VAR).ok()?;
    Some(MySqlStore::connect(&url).await.unwrap())
}

async fn column_names(store: &MySqlStore, table: &str) -> Vec<String> {
    store
        .fetch_all(&format!("SHOW COLUMNS FROM `{table}`"), &[])
        .await
        .unwrap()
        .iter()
        .filter_map(|row| row.get("Field").map(ToString::to_string))
        .collect()
}

#[tokio::test]
async fn test_mysql_migration_lifecycle() {
    let Some(store) = connect().await else {
        eprintln!("{URL_VAR} not set, skipping");
        return;
    };
    let factory = MigrationFactory::with_prefix("schemata_test_");
    let table = factory.prefix_table("tablename");
    let executor = MigrationExecutor::new(store.clone());

    store
        .execute(&format!("DROP TABLE IF EXISTS `{table}`"), &[])
        .await
        .unwrap();

    let migrations = vec![
        factory.create_table(
            "tablename",
            [("column1", r#"VARCHAR(200) DEFAULT """#), ("column2", "INT(11) NOT NULL")],
        ),
        factory.add_column("tablename", "column3", "SMALLINT(1)", None),
        factory.add_index("tablename", ["column1", "column3"]),
        factory.change_column_type("tablename", "column2", "SMALLINT(4) NOT NULL"),
    ];
    executor.execute_all(&migrations).await.unwrap();
    assert_eq!(
        column_names(&store, &table).await,
        vec!["column1", "column2", "column3"]
    );

    let index = store
        .fetch_all(&format!("SHOW INDEX FROM `{table}`"), &[])
        .await
        .unwrap();
    assert_eq!(index[0].get_str("Key_name"), Some("column1"));
    assert_eq!(index[1].get_str("Column_name"), Some("column3"));

    // Re-running tolerates the server's "already there" errors.
    let rerun = executor.execute_all(&migrations[..2]).await.unwrap();
    assert_eq!(
        rerun.outcomes,
        vec![
            MigrationOutcome::Ignored { code: ErrorCode(1050) },
            MigrationOutcome::Ignored { code: ErrorCode(1060) },
        ]
    );
    assert_eq!(
        executor
            .execute(&factory.add_index("tablename", ["column1", "column3(10)"]))
            .await
            .unwrap(),
        MigrationOutcome::Ignored { code: ErrorCode(1072) }
    );

    // Clamping needs a non-strict session; the pool holds one connection.
    store.execute("SET SESSION sql_mode = ''", &[]).await.unwrap();
    executor
        .execute(&factory.insert(
            "tablename",
            [("column1", "my text"), ("column2", "554934"), ("column3", "1")],
        ))
        .await
        .unwrap();
    let rows = store
        .fetch_all(&format!("SELECT * FROM `{table}`"), &[])
        .await
        .unwrap();
    assert_eq!(rows[0].get("column2"), Some(&SqlValue::Int(32767)));

    let drop = factory.drop_table("tablename");
    executor.execute(&drop).await.unwrap();
    assert!(matches!(
        executor.execute(&drop).await.unwrap(),
        MigrationOutcome::Ignored { .. }
    ));
}

#[tokio::test]
async fn test_mysql_error_codes() {
    let Some(store) = connect().await else {
        eprintln!("{URL_VAR} not set, skipping");
        return;
    };

    let err = store
        .execute("ALTER TABLE `schemata_test_missing` ADD COLUMN `c` INT", &[])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode(1146)));

    let err = store.execute("NOT SQL", &[]).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode(1064)));
}
