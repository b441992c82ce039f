//! SQL dialect hooks
//!
//! Dialects supply the small set of syntax quirks the helper needs:
//! pagination, row limiting, identifier quoting and the shape of a stored
//! procedure call. Every hook is pure string formatting.

use serde::{Deserialize, Serialize};

use crate::{DbHelperError, Parameter, Result};

/// Backend family a helper talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    SqlServer,
    Sqlite,
}

impl DatabaseType {
    /// Driver name registered for this backend
    pub fn driver_name(self) -> &'static str {
        match self {
            DatabaseType::SqlServer => "mssql",
            DatabaseType::Sqlite => "sqlite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseType::SqlServer => write!(f, "SQL Server"),
            DatabaseType::Sqlite => write!(f, "SQLite"),
        }
    }
}

/// Dialect-specific SQL templating
pub trait SqlDialect: Send + Sync {
    /// The backend this dialect belongs to
    fn database_type(&self) -> DatabaseType;

    /// Quote an identifier (table name, column name, etc.)
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Wrap `data_sql` so it returns rows `start_row..end_row`
    ///
    /// `start_row` is the number of rows skipped; `end_row` is exclusive. An
    /// `end_row` before `start_row` yields an empty page.
    fn page_row_num_sql(&self, data_sql: &str, start_row: u64, end_row: u64) -> String;

    /// Wrap `data_sql` so it returns at most `row_limit` rows
    fn row_limit_sql(&self, data_sql: &str, row_limit: u64) -> String;

    /// SQL text that invokes the stored procedure `name` with `params`
    fn procedure_call_sql(&self, name: &str, _params: &[Parameter]) -> Result<String> {
        Err(DbHelperError::NotSupported(format!(
            "{} does not support stored procedures (tried to call '{}')",
            self.database_type(),
            name
        )))
    }
}
