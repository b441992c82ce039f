//! DbHelper facade
//!
//! One object per database that hides connection handling. Every operation
//! opens its own connection from the factory, runs and closes it again.

use std::path::Path;
use std::sync::Arc;

use dbhelper_core::{
    Batch, Command, CommandKind, ConfiguredConnector, Connection, ConnectionConfig,
    ConnectionFactory, DatabaseDriver, DatabaseType, DbHelperError, Parameter, QueryResult,
    Result, SqlDialect, Value,
};
use dbhelper_drivers::DriverRegistry;

use crate::batch::{BatchExecutor, BatchOutcome};

/// Database access helper bound to one backend
#[derive(Clone)]
pub struct DbHelper {
    factory: Arc<dyn ConnectionFactory>,
    dialect: Arc<dyn SqlDialect>,
    executor: BatchExecutor,
}

impl DbHelper {
    pub fn new(factory: Arc<dyn ConnectionFactory>, dialect: Arc<dyn SqlDialect>) -> Self {
        let executor = BatchExecutor::new(Arc::clone(&factory));
        Self {
            factory,
            dialect,
            executor,
        }
    }

    /// Helper that connects through `driver` with `config`
    pub fn from_driver(driver: Arc<dyn DatabaseDriver>, config: ConnectionConfig) -> Self {
        let dialect = driver.dialect();
        Self::new(Arc::new(ConfiguredConnector::new(driver, config)), dialect)
    }

    /// Helper for the built-in driver named by `config.driver`
    pub fn from_config(config: ConnectionConfig) -> Result<Self> {
        let connector = DriverRegistry::with_defaults().connector(&config)?;
        Ok(Self::from_connector(connector))
    }

    /// Helper for a built-in driver and its native connection string
    pub fn from_connection_string(driver_name: &str, conn_str: &str) -> Result<Self> {
        let connector =
            DriverRegistry::with_defaults().connector_from_connection_string(driver_name, conn_str)?;
        Ok(Self::from_connector(connector))
    }

    /// Load a TOML or JSON connection config from `path`
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(ConnectionConfig::load(path)?)
    }

    fn from_connector(connector: ConfiguredConnector) -> Self {
        let dialect = connector.driver().dialect();
        Self::new(Arc::new(connector), dialect)
    }

    pub fn database_type(&self) -> DatabaseType {
        self.dialect.database_type()
    }

    pub fn dialect(&self) -> &Arc<dyn SqlDialect> {
        &self.dialect
    }

    /// Run one command without a transaction and return its affected rows
    #[tracing::instrument(skip(self, command), fields(sql_preview = %command.preview()))]
    pub async fn execute_non_query(&self, command: &Command) -> Result<u64> {
        let conn = self.open().await?;
        let result = conn.execute_command(command).await;
        release(conn, result).await.map(|r| r.affected_rows)
    }

    /// Call stored procedure `name` without a transaction
    pub async fn execute_procedure(&self, name: &str, params: &[Parameter]) -> Result<u64> {
        let command = Command::procedure(name).with_parameters(params.iter().cloned());
        self.execute_non_query(&command).await
    }

    /// Call stored procedure `name` inside its own transaction
    pub async fn execute_procedure_tran(&self, name: &str, params: &[Parameter]) -> Result<u64> {
        let command = Command::procedure(name).with_parameters(params.iter().cloned());
        self.execute_sql_tran(&command).await
    }

    /// Run one command inside its own transaction
    ///
    /// The transaction commits when the command succeeds and rolls back when
    /// it fails. A required affected row count is checked before committing.
    #[tracing::instrument(skip(self, command), fields(sql_preview = %command.preview()))]
    pub async fn execute_sql_tran(&self, command: &Command) -> Result<u64> {
        let conn = self.open().await?;
        let result = execute_in_transaction(conn.as_ref(), command).await;
        release(conn, result).await
    }

    /// Run `batch` as chunked transactions of at most `chunk_size` commands
    pub async fn execute_sqls_tran(&self, batch: &Batch, chunk_size: usize) -> Result<BatchOutcome> {
        self.executor.execute_batch(batch, chunk_size).await
    }

    /// Run a text query and materialize every row
    pub async fn query(&self, sql: &str, params: &[Parameter]) -> Result<QueryResult> {
        self.query_with_kind(sql, CommandKind::Text, params).await
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %preview(sql)))]
    pub async fn query_with_kind(
        &self,
        sql: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<QueryResult> {
        let conn = self.open().await?;
        let result = conn.query(sql, kind, params).await;
        release(conn, result).await
    }

    /// First column of the first row, `None` for SQL NULL or no rows
    pub async fn query_scalar(
        &self,
        sql: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<Option<Value>> {
        let result = self.query_with_kind(sql, kind, params).await?;
        Ok(result
            .first_value()
            .filter(|value| !value.is_null())
            .cloned())
    }

    /// Whether `SELECT 1` comes back as `1`
    pub async fn test_connection_string(&self) -> Result<bool> {
        let result = self.query("SELECT 1", &[]).await?;
        Ok(result
            .first_value()
            .is_some_and(|value| value.to_string() == "1"))
    }

    /// Rows `start_row..end_row` of `data_sql`
    pub fn page_row_num_sql(&self, data_sql: &str, start_row: u64, end_row: u64) -> String {
        self.dialect.page_row_num_sql(data_sql, start_row, end_row)
    }

    /// At most `row_limit` rows of `data_sql`
    pub fn row_limit_sql(&self, data_sql: &str, row_limit: u64) -> String {
        self.dialect.row_limit_sql(data_sql, row_limit)
    }

    pub fn quote_identifier(&self, ident: &str) -> String {
        self.dialect.quote_identifier(ident)
    }

    async fn open(&self) -> Result<Arc<dyn Connection>> {
        self.factory.create().await.map_err(|e| {
            tracing::error!(error = %e, "failed to open connection");
            e
        })
    }
}

impl std::fmt::Debug for DbHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbHelper")
            .field("database_type", &self.database_type())
            .finish_non_exhaustive()
    }
}

async fn execute_in_transaction(conn: &dyn Connection, command: &Command) -> Result<u64> {
    let tx = conn.begin_transaction().await.map_err(|e| match e {
        DbHelperError::Transaction(_) => e,
        other => DbHelperError::Transaction(format!("Failed to begin transaction: {}", other)),
    })?;

    let result = tx.execute_command(command).await.and_then(|r| {
        if command.require_affected_rows && r.affected_rows == 0 {
            Err(DbHelperError::Validation {
                command: command.preview(),
            })
        } else {
            Ok(r.affected_rows)
        }
    });

    match result {
        Ok(rows) => {
            tx.commit().await?;
            Ok(rows)
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}

/// Close `conn` and hand back `result` untouched
async fn release<T>(conn: Arc<dyn Connection>, result: Result<T>) -> Result<T> {
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "failed to close connection");
    }
    if let Err(e) = &result {
        tracing::error!(error = %e, "database operation failed");
    }
    result
}

fn preview(sql: &str) -> String {
    Command::text(sql).preview()
}
