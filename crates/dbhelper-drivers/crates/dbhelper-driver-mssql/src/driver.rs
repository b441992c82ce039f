//! SQL Server driver implementation

use crate::MssqlDialect;
use crate::connection::MssqlConnection;
use async_trait::async_trait;
use dbhelper_core::{
    Connection, ConnectionConfig, DatabaseDriver, DatabaseType, DbHelperError, Result, SqlDialect,
};
use std::sync::Arc;

const DEFAULT_PORT: u16 = 1433;

/// SQL Server database driver
pub struct MssqlDriver;

impl MssqlDriver {
    /// Create a new SQL Server driver instance
    pub fn new() -> Self {
        tracing::debug!("SQL Server driver initialized");
        Self
    }
}

impl Default for MssqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for MssqlDriver {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn display_name(&self) -> &'static str {
        "MS SQL Server"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    fn dialect(&self) -> Arc<dyn SqlDialect> {
        Arc::new(MssqlDialect)
    }

    fn default_port(&self) -> Option<u16> {
        Some(DEFAULT_PORT)
    }

    #[tracing::instrument(skip(self, config), fields(host = config.get_string("host").as_deref(), database = config.get_string("database").as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        tracing::debug!("connecting to SQL Server");
        let connection = MssqlConnection::from_config(config).await.map_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQL Server");
            DbHelperError::from(e)
        })?;
        Ok(Arc::new(connection))
    }

    /// Parse an ADO.NET style connection string
    ///
    /// `Server=host,port;Database=db;User Id=user;Password=pass`. Keys are
    /// case-insensitive; `Data Source`, `Initial Catalog`, `UID` and `PWD` are
    /// accepted as aliases. `TrustServerCertificate` maps to the
    /// `trust_cert` parameter and unknown keys are kept as parameters.
    fn parse_connection_string(&self, conn_str: &str) -> Result<ConnectionConfig> {
        let mut config = ConnectionConfig::new(self.name());

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=').ok_or_else(|| {
                DbHelperError::Configuration(format!(
                    "Malformed connection string segment: '{}'",
                    part
                ))
            })?;
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "server" | "data source" | "address" | "addr" => {
                    let server = value.strip_prefix("tcp:").unwrap_or(value);
                    match server.split_once(',') {
                        Some((host, port)) => {
                            config.host = host.trim().to_string();
                            config.port = port.trim().parse().map_err(|_| {
                                DbHelperError::Configuration(format!(
                                    "Invalid port in connection string: '{}'",
                                    port
                                ))
                            })?;
                        }
                        None => config.host = server.to_string(),
                    }
                }
                "database" | "initial catalog" => config.database = Some(value.to_string()),
                "user id" | "uid" | "user" => config.username = Some(value.to_string()),
                "password" | "pwd" => config.password = Some(value.to_string()),
                "trustservercertificate" => {
                    config
                        .params
                        .insert("trust_cert".into(), value.to_ascii_lowercase());
                }
                other => {
                    config.params.insert(other.to_string(), value.to_string());
                }
            }
        }

        if config.host.is_empty() {
            return Err(DbHelperError::Configuration(
                "SQL Server connection string requires 'Server'".into(),
            ));
        }
        Ok(config)
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        let host = config
            .get_string("host")
            .unwrap_or_else(|| "localhost".to_string());
        let port = if config.port > 0 {
            config.port
        } else {
            DEFAULT_PORT
        };
        let database = config.get_string("database");
        let user = config
            .get_string("user")
            .or_else(|| config.get_string("username"));

        let mut conn_str = format!("Server={},{}", host, port);

        if let Some(db) = database {
            conn_str.push_str(&format!(";Database={}", db));
        }

        if let Some(u) = user {
            conn_str.push_str(&format!(";User Id={}", u));
            if let Some(p) = config.get_string("password") {
                conn_str.push_str(&format!(";Password={}", p));
            }
        }

        if config.get_bool("trust_cert") {
            conn_str.push_str(";TrustServerCertificate=True");
        }

        conn_str
    }
}
