//! SQL Server connection implementation using tiberius

use async_trait::async_trait;
use dbhelper_core::{
    ColumnMeta, CommandKind, Connection, ConnectionConfig, DbHelperError, Parameter,
    ParameterDirection, QueryResult, Result, Row, SqlDialect, StatementResult, Transaction, Value,
};
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, Row as TiberiusRow, ToSql};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::MssqlDialect;

type TdsClient = Client<Compat<TcpStream>>;

/// SQL Server connection errors
#[derive(Debug, thiserror::Error)]
pub enum MssqlConnectionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MssqlConnectionError> for DbHelperError {
    fn from(err: MssqlConnectionError) -> Self {
        match err {
            MssqlConnectionError::ConnectionFailed(_)
            | MssqlConnectionError::AuthenticationFailed(_)
            | MssqlConnectionError::ConnectionClosed
            | MssqlConnectionError::Io(_) => DbHelperError::Connection(err.to_string()),
            MssqlConnectionError::QueryFailed(_)
            | MssqlConnectionError::TypeConversion(_)
            | MssqlConnectionError::Tiberius(_) => DbHelperError::Execution(err.to_string()),
        }
    }
}

/// Client shared between a connection and its live transaction
struct SharedClient {
    client: Mutex<TdsClient>,
    /// Set when a transaction is dropped unfinished; the next lock rolls it back.
    abandoned: AtomicBool,
}

impl SharedClient {
    async fn lock(&self) -> MutexGuard<'_, TdsClient> {
        let mut client = self.client.lock().await;
        if self.abandoned.swap(false, Ordering::SeqCst) {
            tracing::warn!("rolling back SQL Server transaction dropped without commit or rollback");
            if let Err(e) =
                run_simple(&mut client, "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
            {
                tracing::error!(error = %e, "automatic rollback failed");
            }
        }
        client
    }
}

/// SQL Server connection using tiberius
pub struct MssqlConnection {
    shared: Arc<SharedClient>,
    closed: AtomicBool,
    database: Option<String>,
}

impl MssqlConnection {
    /// Create a new SQL Server connection
    ///
    /// # Arguments
    /// * `host` - Server hostname
    /// * `port` - Server port (default 1433)
    /// * `database` - Database name (optional)
    /// * `username` - SQL Server login
    /// * `password` - Password
    /// * `trust_cert` - Whether to trust server certificate (for dev/testing)
    #[tracing::instrument(skip(password))]
    pub async fn connect(
        host: &str,
        port: u16,
        database: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
        trust_cert: bool,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        tracing::debug!("connecting to SQL Server at {}:{}", host, port);

        let mut config = Config::new();
        config.host(host);
        config.port(port);

        if let Some(db) = database {
            config.database(db);
        }

        if trust_cert {
            config.trust_cert();
        }

        config.encryption(EncryptionLevel::Required);

        let Some(user) = username else {
            return Err(MssqlConnectionError::AuthenticationFailed(
                "SQL Server authentication requires a user name".to_string(),
            ));
        };
        config.authentication(AuthMethod::sql_server(user, password.unwrap_or("")));

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tcp.set_nodelay(true)?;
        let compat_stream = tcp.compat_write();

        let client = Client::connect(config, compat_stream)
            .await
            .map_err(|e| MssqlConnectionError::ConnectionFailed(e.to_string()))?;

        tracing::debug!("successfully connected to SQL Server");

        Ok(Self {
            shared: Arc::new(SharedClient {
                client: Mutex::new(client),
                abandoned: AtomicBool::new(false),
            }),
            closed: AtomicBool::new(false),
            database: database.map(String::from),
        })
    }

    /// Create connection from config with standard keys
    pub async fn from_config(
        config: &ConnectionConfig,
    ) -> std::result::Result<Self, MssqlConnectionError> {
        let host = config
            .get_string("host")
            .unwrap_or_else(|| "localhost".to_string());
        let port = if config.port > 0 { config.port } else { 1433 };
        let database = config.get_string("database");
        let username = config
            .get_string("user")
            .or_else(|| config.get_string("username"));
        let password = config.get_string("password");

        Self::connect(
            &host,
            port,
            database.as_deref(),
            username.as_deref(),
            password.as_deref(),
            config.get_bool("trust_cert"),
        )
        .await
    }

    /// Database selected at login, if any
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn ensure_not_closed(&self) -> std::result::Result<(), MssqlConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MssqlConnectionError::ConnectionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    fn driver_name(&self) -> &str {
        "mssql"
    }

    #[tracing::instrument(skip(self, text, params), fields(sql_preview = %text.chars().take(100).collect::<String>()))]
    async fn execute(
        &self,
        text: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<StatementResult> {
        self.ensure_not_closed()?;
        let mut client = self.shared.lock().await;
        let affected_rows = execute_on(&mut client, text, kind, params).await?;
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
        let mut client = self.shared.lock().await;
        Ok(query_on(&mut client, text, kind, params).await?)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.ensure_not_closed()?;
        tracing::debug!("beginning SQL Server transaction");
        {
            let mut client = self.shared.lock().await;
            run_simple(&mut client, "BEGIN TRANSACTION")
                .await
                .map_err(|e| {
                    DbHelperError::Transaction(format!("Failed to begin transaction: {}", e))
                })?;
        }
        Ok(Box::new(MssqlTransaction {
            shared: Arc::clone(&self.shared),
            finished: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // A pending abandoned transaction is rolled back before the socket goes away.
        drop(self.shared.lock().await);
        tracing::debug!("SQL Server connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("database", &self.database)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// SQL Server transaction
///
/// Runs `BEGIN` / `COMMIT` / `ROLLBACK TRANSACTION` batches on the client it
/// shares with its connection. Dropping it unfinished flags the client, and the
/// next command on that connection rolls the open transaction back first.
pub struct MssqlTransaction {
    shared: Arc<SharedClient>,
    finished: bool,
}

impl Drop for MssqlTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.abandoned.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Transaction for MssqlTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("committing SQL Server transaction");
        {
            let mut client = self.shared.client.lock().await;
            run_simple(&mut client, "COMMIT TRANSACTION")
                .await
                .map_err(|e| {
                    DbHelperError::Transaction(format!("Failed to commit transaction: {}", e))
                })?;
        }
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        tracing::debug!("rolling back SQL Server transaction");
        {
            let mut client = self.shared.client.lock().await;
            run_simple(&mut client, "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
                .await
                .map_err(|e| {
                    DbHelperError::Transaction(format!("Failed to rollback transaction: {}", e))
                })?;
        }
        self.finished = true;
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<QueryResult> {
        tracing::debug!(sql_preview = %text.chars().take(100).collect::<String>(), "executing query in SQL Server transaction");
        let mut client = self.shared.client.lock().await;
        Ok(query_on(&mut client, text, kind, params).await?)
    }

    async fn execute(
        &self,
        text: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<StatementResult> {
        tracing::debug!(sql_preview = %text.chars().take(100).collect::<String>(), "executing statement in SQL Server transaction");
        let mut client = self.shared.client.lock().await;
        let affected_rows = execute_on(&mut client, text, kind, params).await?;
        Ok(StatementResult::new(affected_rows))
    }
}

/// Send a plain SQL batch and drain its results
async fn run_simple(
    client: &mut TdsClient,
    sql: &str,
) -> std::result::Result<(), MssqlConnectionError> {
    client.simple_query(sql).await?.into_results().await?;
    Ok(())
}

/// SQL text sent to the server and the parameters bound to it
pub(crate) fn prepare_statement<'a>(
    text: &'a str,
    kind: CommandKind,
    params: &[Parameter],
) -> Result<(Cow<'a, str>, Vec<SqlParam>)> {
    match kind {
        CommandKind::Text => Ok((Cow::Borrowed(text), params_to_sql(params.iter()))),
        CommandKind::StoredProcedure => {
            let sql = MssqlDialect.procedure_call_sql(text, params)?;
            let bound = params
                .iter()
                .filter(|p| p.direction != ParameterDirection::ReturnValue);
            Ok((Cow::Owned(sql), params_to_sql(bound)))
        }
    }
}

async fn execute_on(
    client: &mut TdsClient,
    text: &str,
    kind: CommandKind,
    params: &[Parameter],
) -> Result<u64> {
    let start = std::time::Instant::now();
    let (sql, bound) = prepare_statement(text, kind, params)?;
    let param_refs: Vec<&dyn ToSql> = bound.iter().map(|p| p as &dyn ToSql).collect();

    match client.execute(sql, &param_refs[..]).await {
        Ok(exec_result) => {
            let affected_rows = exec_result.rows_affected().iter().sum::<u64>();
            tracing::debug!(
                affected_rows,
                duration_ms = start.elapsed().as_millis() as u64,
                "execute completed"
            );
            Ok(affected_rows)
        }
        Err(e) => {
            tracing::error!(error = %e, "execute failed");
            Err(MssqlConnectionError::QueryFailed(e.to_string()).into())
        }
    }
}

async fn query_on(
    client: &mut TdsClient,
    text: &str,
    kind: CommandKind,
    params: &[Parameter],
) -> std::result::Result<QueryResult, MssqlConnectionError> {
    let start = std::time::Instant::now();
    let (sql, bound) = prepare_statement(text, kind, params)
        .map_err(|e| MssqlConnectionError::QueryFailed(e.to_string()))?;
    let param_refs: Vec<&dyn ToSql> = bound.iter().map(|p| p as &dyn ToSql).collect();

    let mut stream = client.query(sql, &param_refs[..]).await.map_err(|e| {
        tracing::error!(error = %e, "query failed");
        MssqlConnectionError::QueryFailed(e.to_string())
    })?;

    let columns: Vec<ColumnMeta> = stream
        .columns()
        .await?
        .map(|cols| {
            cols.iter()
                .enumerate()
                .map(|(idx, col)| tiberius_column_to_meta(col, idx))
                .collect()
        })
        .unwrap_or_default();
    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let tib_rows = stream.into_first_result().await?;
    let mut rows: Vec<Row> = Vec::with_capacity(tib_rows.len());
    for tib_row in tib_rows {
        rows.push(Row::new(column_names.clone(), tiberius_row_to_values(tib_row)?));
    }

    let execution_time_ms = start.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        duration_ms = execution_time_ms,
        "query completed"
    );

    Ok(QueryResult {
        columns,
        rows,
        execution_time_ms,
    })
}

fn tiberius_column_to_meta(col: &tiberius::Column, ordinal: usize) -> ColumnMeta {
    ColumnMeta {
        name: col.name().to_string(),
        data_type: format!("{:?}", col.column_type()),
        ordinal,
    }
}

fn tiberius_row_to_values(
    row: TiberiusRow,
) -> std::result::Result<Vec<Value>, MssqlConnectionError> {
    row.into_iter().map(column_data_to_value).collect()
}

fn base_date(year: i32) -> std::result::Result<chrono::NaiveDate, MssqlConnectionError> {
    chrono::NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| MssqlConnectionError::TypeConversion(format!("invalid base year {}", year)))
}

/// Time of day from `increments` units of `10^-scale` seconds
fn time_from_increments(increments: u64, scale: u8) -> chrono::NaiveTime {
    let nanos = increments.saturating_mul(10u64.pow(9u32.saturating_sub(scale as u32)));
    chrono::NaiveTime::from_num_seconds_from_midnight_opt(
        (nanos / 1_000_000_000) as u32,
        (nanos % 1_000_000_000) as u32,
    )
    .unwrap_or_default()
}

fn datetime2_to_naive(
    dt2: tiberius::time::DateTime2,
) -> std::result::Result<chrono::NaiveDateTime, MssqlConnectionError> {
    let date = base_date(1)? + chrono::Duration::days(dt2.date().days() as i64);
    let time = time_from_increments(dt2.time().increments(), dt2.time().scale());
    Ok(chrono::NaiveDateTime::new(date, time))
}

/// Convert tiberius ColumnData to a DBHelper Value
pub(crate) fn column_data_to_value(
    col_data: ColumnData<'static>,
) -> std::result::Result<Value, MssqlConnectionError> {
    let value = match col_data {
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::U8(v) => v.map(|v| Value::Int16(v as i16)).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(Value::Int16).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(Value::Int32).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::Int64).unwrap_or(Value::Null),
        ColumnData::F32(v) => v.map(Value::Float32).unwrap_or(Value::Null),
        ColumnData::F64(v) => v.map(Value::Float64).unwrap_or(Value::Null),
        ColumnData::String(v) => v
            .map(|s| Value::String(s.into_owned()))
            .unwrap_or(Value::Null),
        ColumnData::Guid(v) => v.map(Value::Uuid).unwrap_or(Value::Null),
        ColumnData::Binary(v) => v
            .map(|b| Value::Bytes(b.into_owned()))
            .unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v
            .map(|n| Value::Decimal(n.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Xml(v) => v
            .map(|x| Value::String(x.into_owned().into_string()))
            .unwrap_or(Value::Null),
        ColumnData::DateTime(None)
        | ColumnData::SmallDateTime(None)
        | ColumnData::DateTime2(None)
        | ColumnData::DateTimeOffset(None)
        | ColumnData::Date(None)
        | ColumnData::Time(None) => Value::Null,
        ColumnData::DateTime(Some(v)) => {
            // 1/300 second ticks since 1900-01-01
            let nanos = v.seconds_fragments() as u64 * 10_000_000 / 3;
            let date = base_date(1900)? + chrono::Duration::days(v.days() as i64);
            let time = time_from_increments(nanos, 9);
            Value::DateTime(chrono::NaiveDateTime::new(date, time))
        }
        ColumnData::SmallDateTime(Some(v)) => {
            let date = base_date(1900)? + chrono::Duration::days(v.days() as i64);
            let time = time_from_increments(v.seconds_fragments() as u64 * 60, 0);
            Value::DateTime(chrono::NaiveDateTime::new(date, time))
        }
        ColumnData::DateTime2(Some(v)) => Value::DateTime(datetime2_to_naive(v)?),
        ColumnData::DateTimeOffset(Some(v)) => {
            // The datetime2 part is stored in UTC on the wire.
            let naive = datetime2_to_naive(v.datetime2())?;
            Value::DateTimeUtc(chrono::DateTime::from_naive_utc_and_offset(
                naive,
                chrono::Utc,
            ))
        }
        ColumnData::Date(Some(v)) => {
            Value::Date(base_date(1)? + chrono::Duration::days(v.days() as i64))
        }
        ColumnData::Time(Some(v)) => Value::Time(time_from_increments(v.increments(), v.scale())),
    };
    Ok(value)
}

/// Owned parameter value bound to a tiberius statement
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlParam {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    DateTime(chrono::NaiveDateTime),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            SqlParam::Null => ColumnData::I32(None),
            SqlParam::Bool(v) => ColumnData::Bit(Some(*v)),
            SqlParam::I16(v) => ColumnData::I16(Some(*v)),
            SqlParam::I32(v) => ColumnData::I32(Some(*v)),
            SqlParam::I64(v) => ColumnData::I64(Some(*v)),
            SqlParam::F32(v) => ColumnData::F32(Some(*v)),
            SqlParam::F64(v) => ColumnData::F64(Some(*v)),
            SqlParam::String(v) => ColumnData::String(Some(Cow::Borrowed(v.as_str()))),
            SqlParam::Bytes(v) => ColumnData::Binary(Some(Cow::Borrowed(v.as_slice()))),
            SqlParam::Uuid(v) => ColumnData::Guid(Some(*v)),
            SqlParam::Date(v) => v.to_sql(),
            SqlParam::Time(v) => v.to_sql(),
            SqlParam::DateTime(v) => v.to_sql(),
            SqlParam::DateTimeUtc(v) => v.to_sql(),
        }
    }
}

impl From<&Value> for SqlParam {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Bool(*b),
            Value::Int16(i) => SqlParam::I16(*i),
            Value::Int32(i) => SqlParam::I32(*i),
            Value::Int64(i) => SqlParam::I64(*i),
            Value::Float32(f) => SqlParam::F32(*f),
            Value::Float64(f) => SqlParam::F64(*f),
            Value::Decimal(d) => SqlParam::String(d.clone()),
            Value::String(s) => SqlParam::String(s.clone()),
            Value::Bytes(b) => SqlParam::Bytes(b.clone()),
            Value::Uuid(u) => SqlParam::Uuid(*u),
            Value::Date(d) => SqlParam::Date(*d),
            Value::Time(t) => SqlParam::Time(*t),
            Value::DateTime(dt) => SqlParam::DateTime(*dt),
            Value::DateTimeUtc(dt) => SqlParam::DateTimeUtc(*dt),
            Value::Json(j) => SqlParam::String(j.to_string()),
        }
    }
}

fn params_to_sql<'p>(params: impl Iterator<Item = &'p Parameter>) -> Vec<SqlParam> {
    params.map(|p| SqlParam::from(&p.value)).collect()
}
