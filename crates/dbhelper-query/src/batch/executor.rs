//! Batch executor implementation
//!
//! Runs an ordered batch as a sequence of chunked transactions over a single
//! connection, applying each command's [`FailurePolicy`] as it goes.

use std::sync::Arc;
use std::time::Instant;

use dbhelper_core::{
    Batch, Command, Connection, ConnectionFactory, DbHelperError, FailurePolicy, Result,
    Transaction,
};

/// Chunk size used when the caller does not pick one
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Value [`legacy_count`] reports for anything other than a completed batch
pub const FAILURE_SENTINEL: i64 = -1;

/// Outcome of a batch that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The batch had no commands; no connection was opened
    NothingToDo,
    /// Every chunk committed
    Completed {
        /// Sum of affected rows over all counted commands
        affected_rows: u64,
        /// Number of committed chunks
        chunks: usize,
    },
}

impl BatchOutcome {
    /// Total affected rows, if the batch completed
    pub fn affected_rows(&self) -> Option<u64> {
        match self {
            BatchOutcome::Completed { affected_rows, .. } => Some(*affected_rows),
            BatchOutcome::NothingToDo => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, BatchOutcome::Completed { .. })
    }
}

/// Collapse a batch result into a single integer
///
/// A completed batch reports its row total. An empty batch and every failure
/// report [`FAILURE_SENTINEL`], so the two cases cannot be told apart here.
pub fn legacy_count(result: &Result<BatchOutcome>) -> i64 {
    match result {
        Ok(BatchOutcome::Completed { affected_rows, .. }) => {
            i64::try_from(*affected_rows).unwrap_or(i64::MAX)
        }
        Ok(BatchOutcome::NothingToDo) | Err(_) => FAILURE_SENTINEL,
    }
}

/// Executes batches of commands in chunked transactions
#[derive(Clone)]
pub struct BatchExecutor {
    factory: Arc<dyn ConnectionFactory>,
}

impl BatchExecutor {
    /// Create an executor that opens one connection per batch from `factory`
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self { factory }
    }

    /// Execute `batch` with [`DEFAULT_CHUNK_SIZE`]
    pub async fn execute(&self, batch: &Batch) -> Result<BatchOutcome> {
        self.execute_batch(batch, DEFAULT_CHUNK_SIZE).await
    }

    /// Execute `batch` in transactions of at most `chunk_size` commands
    ///
    /// One connection is opened for the whole batch and closed on every exit
    /// path. Chunks run in order; each begins, runs its commands in order and
    /// then commits or rolls back.
    ///
    /// A command failing under [`FailurePolicy::Abort`] rolls its chunk back
    /// and stops the batch with [`DbHelperError::ChunkAborted`]. Chunks before
    /// it stay committed in the database even though no row total is
    /// returned for them. Under [`FailurePolicy::Continue`] the failure is
    /// logged and the command contributes zero rows.
    ///
    /// Commands with empty text are skipped. A `chunk_size` of zero is a
    /// [`DbHelperError::Configuration`] error and an empty batch returns
    /// [`BatchOutcome::NothingToDo`], both without opening a connection.
    #[tracing::instrument(skip(self, batch), fields(commands = batch.len()))]
    pub async fn execute_batch(&self, batch: &Batch, chunk_size: usize) -> Result<BatchOutcome> {
        if chunk_size == 0 {
            return Err(DbHelperError::Configuration(
                "chunk size must be greater than zero".into(),
            ));
        }
        if batch.is_empty() {
            tracing::debug!("empty batch, nothing to do");
            return Ok(BatchOutcome::NothingToDo);
        }

        let start = Instant::now();
        let conn = self.factory.create().await.map_err(|e| {
            tracing::error!(error = %e, "failed to open connection for batch");
            e
        })?;

        let result = run_chunks(conn.as_ref(), batch.commands(), chunk_size).await;

        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "failed to close batch connection");
        }

        match &result {
            Ok(outcome) => tracing::info!(
                affected_rows = outcome.affected_rows().unwrap_or(0),
                duration_ms = start.elapsed().as_millis() as u64,
                "batch completed"
            ),
            Err(e) => tracing::error!(
                error = %e,
                duration_ms = start.elapsed().as_millis() as u64,
                "batch failed"
            ),
        }
        result
    }
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor").finish_non_exhaustive()
    }
}

async fn run_chunks(
    conn: &dyn Connection,
    commands: &[Command],
    chunk_size: usize,
) -> Result<BatchOutcome> {
    let mut affected_rows = 0u64;
    let mut chunks = 0usize;

    for (chunk, chunk_commands) in commands.chunks(chunk_size).enumerate() {
        let tx = conn
            .begin_transaction()
            .await
            .map_err(|e| transaction_error(e, "begin", chunk))?;

        let chunk_result = run_chunk(&*tx, chunk, chunk_commands).await;
        match chunk_result {
            Ok(chunk_rows) => {
                tx.commit()
                    .await
                    .map_err(|e| transaction_error(e, "commit", chunk))?;
                affected_rows += chunk_rows;
                chunks += 1;
                tracing::debug!(chunk, affected_rows = chunk_rows, "chunk committed");
            }
            Err(source) => {
                tracing::error!(chunk, error = %source, "chunk aborted, rolling back");
                if let Err(e) = tx.rollback().await {
                    tracing::error!(chunk, error = %e, "rollback of aborted chunk failed");
                }
                return Err(DbHelperError::ChunkAborted {
                    chunk,
                    source: Box::new(source),
                });
            }
        }
    }

    Ok(BatchOutcome::Completed {
        affected_rows,
        chunks,
    })
}

/// Run one chunk's commands; `Err` means the chunk must be rolled back
async fn run_chunk(tx: &dyn Transaction, chunk: usize, commands: &[Command]) -> Result<u64> {
    let mut total = 0u64;

    for (index, command) in commands.iter().enumerate() {
        if command.is_empty() {
            continue;
        }

        match execute_checked(tx, command).await {
            Ok(rows) => total += rows,
            Err(e) => match command.failure_policy {
                FailurePolicy::Abort => return Err(e),
                FailurePolicy::Continue => {
                    tracing::warn!(
                        chunk,
                        index,
                        sql_preview = %command.preview(),
                        error = %e,
                        "command failed, continuing"
                    );
                }
            },
        }
    }

    Ok(total)
}

async fn execute_checked(tx: &dyn Transaction, command: &Command) -> Result<u64> {
    let result = tx.execute_command(command).await?;
    if command.require_affected_rows && result.affected_rows == 0 {
        return Err(DbHelperError::Validation {
            command: command.preview(),
        });
    }
    Ok(result.affected_rows)
}

fn transaction_error(err: DbHelperError, action: &str, chunk: usize) -> DbHelperError {
    tracing::error!(chunk, error = %err, "failed to {} transaction", action);
    match err {
        DbHelperError::Transaction(_) => err,
        other => DbHelperError::Transaction(format!(
            "Failed to {} transaction for chunk {}: {}",
            action, chunk, other
        )),
    }
}
