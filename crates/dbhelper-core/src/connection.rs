//! Connection and transaction traits

use crate::{Command, CommandKind, Parameter, QueryResult, Result, StatementResult};
use async_trait::async_trait;
use std::sync::Arc;

/// A database connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "mssql")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE) or a
    /// stored procedure, outside of any explicit transaction
    async fn execute(
        &self,
        text: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<StatementResult>;

    /// Execute a query that returns rows
    async fn query(&self, text: &str, kind: CommandKind, params: &[Parameter])
    -> Result<QueryResult>;

    /// Begin a transaction
    ///
    /// At most one transaction is live on a connection at a time. A
    /// transaction dropped without `commit` or `rollback` is rolled back.
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Execute a [`Command`] outside of any explicit transaction
    async fn execute_command(&self, command: &Command) -> Result<StatementResult> {
        self.execute(&command.text, command.kind, &command.parameters)
            .await
    }
}

/// A database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Execute a query within the transaction
    async fn query(&self, text: &str, kind: CommandKind, params: &[Parameter])
    -> Result<QueryResult>;

    /// Execute a statement within the transaction
    async fn execute(
        &self,
        text: &str,
        kind: CommandKind,
        params: &[Parameter],
    ) -> Result<StatementResult>;

    /// Execute a [`Command`] within the transaction
    async fn execute_command(&self, command: &Command) -> Result<StatementResult> {
        self.execute(&command.text, command.kind, &command.parameters)
            .await
    }
}

/// Factory for opening new connections from preconfigured settings
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new connection
    ///
    /// Fails with [`crate::DbHelperError::Connection`] on network or
    /// authentication problems.
    async fn create(&self) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }
}
