//! SQLite driver implementation

use async_trait::async_trait;
use dbhelper_core::{
    Connection, ConnectionConfig, DatabaseDriver, DatabaseType, DbHelperError, Result, SqlDialect,
};
use std::sync::Arc;

use crate::{SqliteConnection, SqliteDialect};

/// SQLite database driver
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn dialect(&self) -> Arc<dyn SqlDialect> {
        Arc::new(SqliteDialect)
    }

    #[tracing::instrument(skip(self, config), fields(path = config.get_string("path").or_else(|| config.get_string("database")).as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let path = config
            .get_string("path")
            .or_else(|| config.get_string("database"))
            .ok_or_else(|| {
                DbHelperError::Configuration(
                    "SQLite requires a 'path' or 'database' setting, e.g. database = \"/path/to/app.db\"".into(),
                )
            })?;

        let conn = SqliteConnection::open(&path).map_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQLite database");
            match e {
                DbHelperError::Connection(_) => e,
                other => DbHelperError::Connection(format!(
                    "Failed to connect to SQLite database: {}",
                    other
                )),
            }
        })?;

        tracing::info!(path = %path, "SQLite connection created");
        Ok(Arc::new(conn))
    }

    /// Accepts a bare path or an ADO-style `Data Source=<path>` string
    fn parse_connection_string(&self, conn_str: &str) -> Result<ConnectionConfig> {
        let trimmed = conn_str.trim();
        if trimmed.is_empty() {
            return Err(DbHelperError::Configuration(
                "SQLite connection string is empty".into(),
            ));
        }

        let mut path = None;
        if trimmed.contains('=') {
            for part in trimmed.split(';').filter(|p| !p.trim().is_empty()) {
                let Some((key, value)) = part.split_once('=') else {
                    continue;
                };
                match key.trim().to_ascii_lowercase().as_str() {
                    "data source" | "datasource" | "filename" | "path" => {
                        path = Some(value.trim().to_string());
                    }
                    _ => {}
                }
            }
        } else {
            path = Some(trimmed.to_string());
        }

        path.filter(|p| !p.is_empty())
            .map(|p| ConnectionConfig::new_sqlite(&p))
            .ok_or_else(|| {
                DbHelperError::Configuration(format!(
                    "SQLite connection string has no 'Data Source': {}",
                    conn_str
                ))
            })
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        config
            .get_string("path")
            .or_else(|| config.get_string("database"))
            .unwrap_or_else(|| ":memory:".to_string())
    }
}
