//! End-to-end batch execution against SQLite database files

#![cfg(feature = "sqlite")]

use std::sync::Arc;

use dbhelper_core::{Batch, Command, CommandKind, ConnectionConfig, DbHelperError, Value};
use dbhelper_driver_sqlite::SqliteDriver;
use dbhelper_query::{BatchOutcome, DEFAULT_CHUNK_SIZE, DbHelper, FAILURE_SENTINEL, legacy_count};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dbhelper_query=debug")
        .with_test_writer()
        .try_init();
}

async fn ledger(dir: &tempfile::TempDir) -> DbHelper {
    init_tracing();
    let path = dir.path().join("ledger.db");
    let helper = DbHelper::from_driver(
        Arc::new(SqliteDriver::new()),
        ConnectionConfig::new_sqlite(path.to_str().unwrap()),
    );
    helper
        .execute_non_query(&Command::text(
            "CREATE TABLE entries (id INTEGER PRIMARY KEY, memo TEXT NOT NULL, amount INTEGER NOT NULL)",
        ))
        .await
        .unwrap();
    helper
}

fn insert(id: i64) -> Command {
    Command::text("INSERT INTO entries (id, memo, amount) VALUES (@id, @memo, @amount)")
        .param("@id", id)
        .param("@memo", format!("entry {}", id))
        .param("@amount", id * 10)
}

async fn entry_count(helper: &DbHelper) -> Option<Value> {
    helper
        .query_scalar("SELECT COUNT(*) FROM entries", CommandKind::Text, &[])
        .await
        .unwrap()
}

#[tokio::test]
async fn test_batch_commits_every_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let helper = ledger(&dir).await;
    let batch: Batch = (1..=25).map(insert).collect();

    let result = helper.execute_sqls_tran(&batch, 10).await;

    assert_eq!(
        result.as_ref().ok(),
        Some(&BatchOutcome::Completed {
            affected_rows: 25,
            chunks: 3
        })
    );
    assert_eq!(legacy_count(&result), 25);
    assert_eq!(entry_count(&helper).await, Some(Value::Int64(25)));
}

#[tokio::test]
async fn test_aborted_chunk_rolls_back_but_earlier_chunks_stay() {
    let dir = tempfile::tempdir().unwrap();
    let helper = ledger(&dir).await;
    let mut batch: Batch = (1..=30).map(insert).collect();
    // primary key clash in the second chunk
    batch.commands[14] = insert(3);

    let result = helper.execute_sqls_tran(&batch, 10).await;

    match &result {
        Err(DbHelperError::ChunkAborted { chunk, source }) => {
            assert_eq!(*chunk, 1);
            assert!(source.is_command_error());
        }
        other => panic!("expected chunk abort, got {:?}", other),
    }
    assert_eq!(legacy_count(&result), FAILURE_SENTINEL);
    // first chunk durable, second rolled back, third never attempted
    assert_eq!(entry_count(&helper).await, Some(Value::Int64(10)));
}

#[tokio::test]
async fn test_tolerated_failures_do_not_break_the_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let helper = ledger(&dir).await;
    let batch = Batch::new()
        .with(insert(1))
        .with(insert(1).continue_on_error())
        .with(
            Command::text("UPDATE entries SET amount = 0 WHERE id = 404")
                .require_affected_rows()
                .continue_on_error(),
        )
        .with(Command::text(""))
        .with(insert(2));

    let result = helper.execute_sqls_tran(&batch, 100).await.unwrap();

    assert_eq!(result.affected_rows(), Some(2));
    assert_eq!(entry_count(&helper).await, Some(Value::Int64(2)));
}

#[tokio::test]
async fn test_required_rows_abort_rolls_back_whole_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let helper = ledger(&dir).await;
    let batch = Batch::new()
        .with(insert(1))
        .with(insert(2))
        .with(Command::text("DELETE FROM entries WHERE id = 404").require_affected_rows());

    let err = helper.execute_sqls_tran(&batch, 100).await.unwrap_err();

    assert!(matches!(err, DbHelperError::ChunkAborted { chunk: 0, .. }));
    assert_eq!(entry_count(&helper).await, Some(Value::Int64(0)));
}

#[tokio::test]
async fn test_empty_batch_is_nothing_to_do() {
    let dir = tempfile::tempdir().unwrap();
    let helper = ledger(&dir).await;

    let result = helper.execute_sqls_tran(&Batch::new(), 10).await;

    assert_eq!(result.as_ref().ok(), Some(&BatchOutcome::NothingToDo));
    assert_eq!(legacy_count(&result), FAILURE_SENTINEL);
}

#[tokio::test]
async fn test_schema_statements_between_writes_count_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let helper = ledger(&dir).await;
    let batch = Batch::new()
        .with(insert(1))
        .with(insert(2))
        .with(insert(3))
        .with(Command::text("CREATE INDEX idx_memo ON entries(memo)"))
        .with(Command::text("CREATE TABLE archive (id INTEGER PRIMARY KEY)"))
        .with(Command::text("UPDATE entries SET amount = 0 WHERE id = 2"))
        .with(Command::text("DROP TABLE archive"));

    let result = helper.execute_sqls_tran(&batch, DEFAULT_CHUNK_SIZE).await;

    assert_eq!(
        result.as_ref().ok(),
        Some(&BatchOutcome::Completed {
            affected_rows: 4,
            chunks: 1
        })
    );
}

#[tokio::test]
async fn test_schema_statement_fails_required_rows_check() {
    let dir = tempfile::tempdir().unwrap();
    let helper = ledger(&dir).await;
    let batch = Batch::new()
        .with(insert(1))
        .with(insert(2))
        .with(insert(3))
        .with(Command::text("CREATE INDEX idx_memo ON entries(memo)").require_affected_rows());

    let result = helper.execute_sqls_tran(&batch, DEFAULT_CHUNK_SIZE).await;

    match &result {
        Err(DbHelperError::ChunkAborted { chunk, source }) => {
            assert_eq!(*chunk, 0);
            assert!(matches!(**source, DbHelperError::Validation { .. }));
        }
        other => panic!("expected chunk abort, got {:?}", other),
    }
    assert_eq!(entry_count(&helper).await, Some(Value::Int64(0)));
}
