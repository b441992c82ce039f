//! Integration tests for the SQLite driver resolved through the registry

#![cfg(feature = "sqlite")]

use dbhelper_core::{CommandKind, Connection, ConnectionConfig, ConnectionFactory, Parameter, Value};
use dbhelper_drivers::DriverRegistry;
use std::sync::Arc;

/// Helper to open a connection to a fresh database file with sample data
async fn setup_test_database(dir: &tempfile::TempDir) -> Arc<dyn Connection> {
    let db_path = dir.path().join("registry_test.db");
    let config = ConnectionConfig::new_sqlite(db_path.to_str().unwrap());
    let connector = DriverRegistry::with_defaults()
        .connector(&config)
        .expect("sqlite driver registered");

    let conn = connector.create().await.expect("Failed to open test database");

    let statements = vec![
        r#"CREATE TABLE accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL UNIQUE,
            balance REAL NOT NULL DEFAULT 0.0
        )"#,
        r#"CREATE TABLE transfers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            from_id INTEGER NOT NULL REFERENCES accounts(id),
            to_id INTEGER NOT NULL REFERENCES accounts(id),
            amount REAL NOT NULL
        )"#,
        "INSERT INTO accounts (owner, balance) VALUES ('alice', 100.0), ('bob', 50.0)",
    ];

    for statement in statements {
        conn.execute(statement, CommandKind::Text, &[])
            .await
            .expect("Failed to setup schema");
    }

    conn
}

#[tokio::test]
async fn test_registry_connector_opens_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let conn = setup_test_database(&dir).await;

    let result = conn
        .query(
            "SELECT owner, balance FROM accounts ORDER BY id",
            CommandKind::Text,
            &[],
        )
        .await
        .unwrap();

    assert_eq!(result.row_count(), 2);
    assert_eq!(
        result.rows[1].get_by_name("owner"),
        Some(&Value::String("bob".into()))
    );
    assert_eq!(
        result.rows[0].get_by_name("balance"),
        Some(&Value::Float64(100.0))
    );
}

#[tokio::test]
async fn test_transaction_spanning_statements_commits_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let conn = setup_test_database(&dir).await;

    let tx = conn.begin_transaction().await.unwrap();
    tx.execute(
        "UPDATE accounts SET balance = balance - @amount WHERE owner = @owner",
        CommandKind::Text,
        &[Parameter::new("@amount", 25.0), Parameter::new("@owner", "alice")],
    )
    .await
    .unwrap();
    tx.execute(
        "UPDATE accounts SET balance = balance + ? WHERE owner = ?",
        CommandKind::Text,
        &[Parameter::positional(25.0), Parameter::positional("bob")],
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let result = conn
        .query(
            "SELECT SUM(balance) FROM accounts WHERE owner IN ('alice', 'bob')",
            CommandKind::Text,
            &[],
        )
        .await
        .unwrap();
    assert_eq!(result.first_value(), Some(&Value::Float64(150.0)));
}

#[tokio::test]
async fn test_foreign_keys_are_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let conn = setup_test_database(&dir).await;

    let err = conn
        .execute(
            "INSERT INTO transfers (from_id, to_id, amount) VALUES (1, 99, 1.0)",
            CommandKind::Text,
            &[],
        )
        .await
        .unwrap_err();
    assert!(err.is_command_error());
}

#[tokio::test]
async fn test_data_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let conn = setup_test_database(&dir).await;
    conn.close().await.unwrap();

    let config = ConnectionConfig::new_sqlite(dir.path().join("registry_test.db").to_str().unwrap());
    let reopened = DriverRegistry::with_defaults()
        .connector(&config)
        .unwrap()
        .create()
        .await
        .unwrap();

    let result = reopened
        .query("SELECT COUNT(*) FROM accounts", CommandKind::Text, &[])
        .await
        .unwrap();
    assert_eq!(result.first_value(), Some(&Value::Int64(2)));
}
