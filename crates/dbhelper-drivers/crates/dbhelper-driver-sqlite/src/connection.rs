//! SQLite connection implementation

use async_trait::async_trait;
use dbhelper_core::{
    ColumnMeta, CommandKind, Connection, DbHelperError, Parameter, QueryResult, Result, Row,
    StatementResult, Transaction, Value,
};
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, OpenFlags, Statement};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// SQLite connection wrapper
pub struct SqliteConnection {
    conn: Arc<Mutex<RusqliteConnection>>,
    closed: AtomicBool,
    path: String,
}

impl SqliteConnection {
    /// Open a SQLite database
    pub fn open(path: &str) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        let expanded_path = Self::expand_path(path)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if path == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                DbHelperError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            if !expanded_path.starts_with("file:") {
                let file_path = std::path::Path::new(&expanded_path);
                if let Some(parent) = file_path.parent()
                    && !parent.exists()
                {
                    return Err(DbHelperError::Connection(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                DbHelperError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?
        };

        conn.pragma_update(None, "foreign_keys", "ON").map_err(|e| {
            DbHelperError::Connection(format!("Failed to enable foreign keys: {}", e))
        })?;

        tracing::info!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            closed: AtomicBool::new(false),
            path: expanded_path,
        })
    }

    /// Path (or URI) this connection was opened with
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Expand path to handle ~ (home directory) and relative paths
    fn expand_path(path: &str) -> Result<String> {
        if path == ":memory:" || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                std::path::PathBuf::from(home)
                    .join(rest)
                    .to_string_lossy()
                    .to_string()
            } else {
                return Err(DbHelperError::Configuration(
                    "Unable to determine HOME directory".into(),
                ));
            }
        } else if path.starts_with('~') {
            return Err(DbHelperError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        let path_buf = std::path::PathBuf::from(&expanded);
        let result = if path_buf.is_relative() {
            std::env::current_dir()?
                .join(path_buf)
                .to_string_lossy()
                .to_string()
        } else {
            expanded
        };

        Ok(result)
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbHelperError::Connection("Connection is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, text, params), fields(sql_preview = %text.chars().take(100).collect::<String>()))]
    async fn execute(
        &self,
        text: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<StatementResult> {
        self.ensure_not_closed()?;
        let conn = self.conn.lock();
        let affected_rows = execute_on(&conn, text, kind, params)?;
        tracing::debug!(affected_rows, "statement executed");
        Ok(StatementResult::new(affected_rows))
    }

    #[tracing::instrument(skip(self, text, params), fields(sql_preview = %text.chars().take(100).collect::<String>()))]
    async fn query(
        &self,
        text: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<QueryResult> {
        self.ensure_not_closed()?;
        let conn = self.conn.lock();
        let result = query_on(&conn, text, kind, params)?;
        tracing::debug!(
            row_count = result.rows.len(),
            execution_time_ms = result.execution_time_ms,
            "query executed successfully"
        );
        Ok(result)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.ensure_not_closed()?;
        tracing::debug!("beginning SQLite transaction");
        {
            let conn = self.conn.lock();
            // DEFERRED takes the write lock on the first write.
            conn.execute_batch("BEGIN DEFERRED").map_err(|e| {
                DbHelperError::Transaction(format!("Failed to begin transaction: {}", e))
            })?;
        }
        Ok(Box::new(SqliteTransaction {
            conn: Arc::clone(&self.conn),
            committed: false,
            rolled_back: false,
        }))
    }

    /// Mark the connection closed; later calls fail with a connection error
    ///
    /// The rusqlite handle and its file lock are released when the last clone
    /// of the shared handle drops, including any live transaction.
    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(path = %self.path, "closing SQLite connection");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// SQLite transaction wrapper.
///
/// Issues raw `BEGIN DEFERRED` / `COMMIT` / `ROLLBACK` SQL so that it can share
/// the connection `Arc<Mutex<…>>` without running into rusqlite's borrow-based
/// transaction lifetime requirements.
pub struct SqliteTransaction {
    conn: Arc<Mutex<RusqliteConnection>>,
    committed: bool,
    rolled_back: bool,
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.committed && !self.rolled_back {
            tracing::warn!(
                "SQLite transaction dropped without commit or rollback, issuing automatic rollback"
            );
            let conn = self.conn.lock();
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::error!(error = %e, "automatic rollback on drop failed");
            }
        }
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("committing SQLite transaction");

        let result = {
            let conn = self.conn.lock();
            conn.execute_batch("COMMIT")
        };
        // A failed COMMIT leaves the transaction open; the drop guard rolls it back.
        result.map_err(|e| {
            DbHelperError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        self.committed = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("rolling back SQLite transaction");

        let result = {
            let conn = self.conn.lock();
            conn.execute_batch("ROLLBACK")
        };
        self.rolled_back = true;
        result.map_err(|e| {
            DbHelperError::Transaction(format!("Failed to rollback transaction: {}", e))
        })
    }

    async fn query(
        &self,
        text: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<QueryResult> {
        tracing::debug!(sql_preview = %text.chars().take(100).collect::<String>(), "executing query in SQLite transaction");
        let conn = self.conn.lock();
        query_on(&conn, text, kind, params)
    }

    async fn execute(
        &self,
        text: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<StatementResult> {
        tracing::debug!(sql_preview = %text.chars().take(100).collect::<String>(), "executing statement in SQLite transaction");
        let conn = self.conn.lock();
        let affected_rows = execute_on(&conn, text, kind, params)?;
        tracing::debug!(affected_rows, "statement executed in SQLite transaction");
        Ok(StatementResult::new(affected_rows))
    }
}

fn ensure_text(text: &str, kind: CommandKind) -> Result<()> {
    if kind == CommandKind::StoredProcedure {
        return Err(DbHelperError::NotSupported(format!(
            "SQLite does not support stored procedures (tried to call '{}')",
            text
        )));
    }
    Ok(())
}

fn prepare<'c>(conn: &'c RusqliteConnection, sql: &str) -> Result<Statement<'c>> {
    conn.prepare(sql)
        .map_err(|e| DbHelperError::Execution(format!("Failed to prepare statement: {}", e)))
}

fn execute_on(
    conn: &RusqliteConnection,
    sql: &str,
    kind: CommandKind,
    params: &[Parameter],
) -> Result<u64> {
    ensure_text(sql, kind)?;
    let mut stmt = prepare(conn, sql)?;
    bind_parameters(&mut stmt, params)?;
    // sqlite3_changes keeps the last write's count across DDL and other
    // non-DML statements, so only trust it when total_changes moved
    let before = total_changes(conn)?;
    let rows_affected = stmt
        .raw_execute()
        .map_err(|e| DbHelperError::Execution(format!("Failed to execute statement: {}", e)))?;
    if total_changes(conn)? == before {
        return Ok(0);
    }
    Ok(rows_affected as u64)
}

fn total_changes(conn: &RusqliteConnection) -> Result<i64> {
    conn.query_row("SELECT total_changes()", [], |row| row.get(0))
        .map_err(|e| DbHelperError::Execution(format!("Failed to read change count: {}", e)))
}

fn query_on(
    conn: &RusqliteConnection,
    sql: &str,
    kind: CommandKind,
    params: &[Parameter],
) -> Result<QueryResult> {
    ensure_text(sql, kind)?;
    let start_time = std::time::Instant::now();
    let mut stmt = prepare(conn, sql)?;

    let columns: Vec<ColumnMeta> = stmt
        .columns()
        .iter()
        .enumerate()
        .map(|(ordinal, col)| ColumnMeta {
            name: col.name().to_string(),
            data_type: col.decl_type().unwrap_or("DYNAMIC").to_string(),
            ordinal,
        })
        .collect();
    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    bind_parameters(&mut stmt, params)?;

    let mut rows = Vec::new();
    let mut query_rows = stmt.raw_query();
    while let Some(row) = query_rows
        .next()
        .map_err(|e| DbHelperError::Execution(format!("Failed to fetch row: {}", e)))?
    {
        let mut values = Vec::with_capacity(column_names.len());
        for i in 0..column_names.len() {
            values.push(rusqlite_to_value(row, i)?);
        }
        rows.push(Row::new(column_names.clone(), values));
    }

    Ok(QueryResult {
        columns,
        rows,
        execution_time_ms: start_time.elapsed().as_millis() as u64,
    })
}

/// Bind parameters by name when every parameter is named, by position otherwise
pub(crate) fn bind_parameters(stmt: &mut Statement<'_>, params: &[Parameter]) -> Result<()> {
    let by_name = !params.is_empty() && params.iter().all(Parameter::is_named);

    if !by_name && params.len() != stmt.parameter_count() {
        return Err(DbHelperError::Execution(format!(
            "Statement expects {} parameters but {} were supplied",
            stmt.parameter_count(),
            params.len()
        )));
    }

    for (position, param) in params.iter().enumerate() {
        let index = if by_name {
            named_index(stmt, param)?
        } else {
            position + 1
        };
        stmt.raw_bind_parameter(index, value_to_rusqlite(&param.value))
            .map_err(|e| {
                DbHelperError::Execution(format!(
                    "Failed to bind parameter {}: {}",
                    if param.name.is_empty() {
                        index.to_string()
                    } else {
                        param.name.clone()
                    },
                    e
                ))
            })?;
    }
    Ok(())
}

fn named_index(stmt: &Statement<'_>, param: &Parameter) -> Result<usize> {
    let bare = param.bare_name();
    for prefix in ['@', ':', '$'] {
        let candidate = format!("{}{}", prefix, bare);
        let index = stmt
            .parameter_index(&candidate)
            .map_err(|e| DbHelperError::Execution(e.to_string()))?;
        if let Some(index) = index {
            return Ok(index);
        }
    }
    Err(DbHelperError::Execution(format!(
        "Statement has no parameter named '{}'",
        param.name
    )))
}

pub(crate) fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
        Value::Int16(i) => rusqlite::types::Value::Integer(*i as i64),
        Value::Int32(i) => rusqlite::types::Value::Integer(*i as i64),
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float32(f) => rusqlite::types::Value::Real(*f as f64),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::Decimal(d) => rusqlite::types::Value::Text(d.clone()),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
        Value::Date(d) => rusqlite::types::Value::Text(d.to_string()),
        Value::Time(t) => rusqlite::types::Value::Text(t.to_string()),
        Value::DateTime(dt) => rusqlite::types::Value::Text(dt.to_string()),
        Value::DateTimeUtc(dt) => rusqlite::types::Value::Text(dt.to_rfc3339()),
        Value::Json(j) => rusqlite::types::Value::Text(j.to_string()),
        Value::Uuid(u) => rusqlite::types::Value::Text(u.to_string()),
    }
}

fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| DbHelperError::Execution(e.to_string()))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    };

    Ok(value)
}
