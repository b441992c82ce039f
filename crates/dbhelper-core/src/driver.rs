//! Database driver trait definition

use crate::{
    Connection, ConnectionConfig, ConnectionFactory, DatabaseType, DbHelperError, Result,
    SqlDialect,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Core driver trait that every backend implements
///
/// A driver is the pluggable per-dialect piece: it knows how to open
/// connections and which [`SqlDialect`] applies to them.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "mssql", "sqlite")
    fn name(&self) -> &'static str;

    /// Display name
    fn display_name(&self) -> &'static str {
        self.name()
    }

    fn database_type(&self) -> DatabaseType;

    /// SQL templating hooks for this backend
    fn dialect(&self) -> Arc<dyn SqlDialect>;

    /// Default connection port (None for file-based databases like SQLite)
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    /// Parse a connection string into a configuration
    fn parse_connection_string(&self, _conn_str: &str) -> Result<ConnectionConfig> {
        Err(DbHelperError::NotSupported(format!(
            "Connection string parsing not implemented for driver '{}'",
            self.name()
        )))
    }

    /// Build a connection string from configuration
    fn build_connection_string(&self, config: &ConnectionConfig) -> String;
}

/// A [`ConnectionFactory`] that opens connections through a driver using a
/// fixed configuration
#[derive(Clone)]
pub struct ConfiguredConnector {
    driver: Arc<dyn DatabaseDriver>,
    config: ConnectionConfig,
}

impl ConfiguredConnector {
    pub fn new(driver: Arc<dyn DatabaseDriver>, config: ConnectionConfig) -> Self {
        Self { driver, config }
    }

    /// Create a connector from a driver-specific connection string
    pub fn from_connection_string(
        driver: Arc<dyn DatabaseDriver>,
        conn_str: &str,
    ) -> Result<Self> {
        let config = driver.parse_connection_string(conn_str)?;
        Ok(Self::new(driver, config))
    }

    pub fn driver(&self) -> &Arc<dyn DatabaseDriver> {
        &self.driver
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The connection string this connector opens, as the driver renders it
    pub fn connection_string(&self) -> String {
        self.driver.build_connection_string(&self.config)
    }
}

impl std::fmt::Debug for ConfiguredConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredConnector")
            .field("driver", &self.driver.name())
            .field("host", &self.config.host)
            .field("database", &self.config.database)
            .finish()
    }
}

#[async_trait]
impl ConnectionFactory for ConfiguredConnector {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        tracing::debug!(driver = self.driver.name(), "opening connection");
        self.driver.connect(&self.config).await
    }
}
