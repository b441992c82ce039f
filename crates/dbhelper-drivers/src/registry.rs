//! Driver registry for managing available database drivers

use dbhelper_core::{
    ConfiguredConnector, ConnectionConfig, DatabaseDriver, DbHelperError, Result, SqlDialect,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available database drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DatabaseDriver>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "sqlite")]
        registry.register(Arc::new(crate::sqlite::SqliteDriver::new()));
        #[cfg(feature = "mssql")]
        registry.register(Arc::new(crate::mssql::MssqlDriver::new()));

        registry
    }

    /// Register a new driver, replacing any driver with the same name
    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        let name = driver.name().to_string();
        tracing::info!(driver = %name, "registering database driver");
        self.drivers.insert(name, driver);
    }

    /// Get a driver by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self.drivers.get(name).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %name, "driver not found in registry");
        }
        driver
    }

    /// List all registered driver names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a driver is registered
    pub fn has(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Dialect for a driver by name
    pub fn dialect(&self, name: &str) -> Option<Arc<dyn SqlDialect>> {
        self.drivers.get(name).map(|driver| driver.dialect())
    }

    /// Build a connector for `config` using the driver it names
    pub fn connector(&self, config: &ConnectionConfig) -> Result<ConfiguredConnector> {
        let driver = self.require(&config.driver)?;
        Ok(ConfiguredConnector::new(driver, config.clone()))
    }

    /// Build a connector from a driver-specific connection string
    pub fn connector_from_connection_string(
        &self,
        driver_name: &str,
        conn_str: &str,
    ) -> Result<ConfiguredConnector> {
        let driver = self.require(driver_name)?;
        ConfiguredConnector::from_connection_string(driver, conn_str)
    }

    fn require(&self, name: &str) -> Result<Arc<dyn DatabaseDriver>> {
        self.get(name).ok_or_else(|| {
            DbHelperError::Configuration(format!(
                "Unknown driver '{}'. Registered drivers: {}",
                name,
                self.list().join(", ")
            ))
        })
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry() {
        let registry = DriverRegistry::new();
        assert!(registry.list().is_empty());
        assert!(!registry.has("sqlite"));
        assert!(registry.get("sqlite").is_none());
    }

    #[cfg(all(feature = "sqlite", feature = "mssql"))]
    #[test]
    fn test_defaults_register_enabled_drivers() {
        let registry = DriverRegistry::with_defaults();
        assert_eq!(registry.list(), vec!["mssql", "sqlite"]);
        assert_eq!(
            registry.dialect("mssql").map(|d| d.database_type()),
            Some(dbhelper_core::DatabaseType::SqlServer)
        );
    }

    #[test]
    fn test_unknown_driver_is_configuration_error() {
        let registry = DriverRegistry::new();
        let err = registry
            .connector(&ConnectionConfig::new("oracle"))
            .unwrap_err();
        assert!(matches!(err, DbHelperError::Configuration(_)));
        assert!(err.to_string().contains("oracle"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_connector_from_connection_string() {
        let registry = DriverRegistry::with_defaults();
        let connector = registry
            .connector_from_connection_string("sqlite", "Data Source=/tmp/app.db")
            .unwrap();
        assert_eq!(connector.driver().name(), "sqlite");
        assert_eq!(connector.connection_string(), "/tmp/app.db");
    }
}
