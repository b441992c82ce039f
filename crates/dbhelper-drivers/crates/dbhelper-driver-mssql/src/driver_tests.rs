//! Unit tests for SQL Server driver

use crate::MssqlDriver;
use dbhelper_core::{ConnectionConfig, DatabaseDriver, DatabaseType, DbHelperError};

#[test]
fn test_mssql_driver_name() {
    let driver = MssqlDriver::new();
    assert_eq!(driver.name(), "mssql");
    assert_eq!(driver.display_name(), "MS SQL Server");
    assert_eq!(driver.database_type(), DatabaseType::SqlServer);
}

#[test]
fn test_mssql_default_port() {
    assert_eq!(MssqlDriver::new().default_port(), Some(1433));
}

#[test]
fn test_mssql_dialect() {
    let dialect = MssqlDriver::new().dialect();
    assert_eq!(dialect.database_type(), DatabaseType::SqlServer);
    assert_eq!(dialect.quote_identifier("t"), "[t]");
}

#[test]
fn test_mssql_connection_string() {
    let driver = MssqlDriver::new();
    let config = ConnectionConfig::new_mssql("localhost", 1433, "testdb", "sa").with_password("secret");

    let conn_str = driver.build_connection_string(&config);

    assert_eq!(
        conn_str,
        "Server=localhost,1433;Database=testdb;User Id=sa;Password=secret"
    );
}

#[test]
fn test_mssql_connection_string_defaults_port_and_trust() {
    let driver = MssqlDriver::new();
    let mut config = ConnectionConfig::new("mssql").with_param("trust_cert", true);
    config.host = "db.internal".to_string();

    let conn_str = driver.build_connection_string(&config);

    assert_eq!(conn_str, "Server=db.internal,1433;TrustServerCertificate=True");
}

#[test]
fn test_parse_connection_string() {
    let config = MssqlDriver::new()
        .parse_connection_string(
            "Server=tcp:db.internal,14330; Initial Catalog=orders; UID=app; PWD=p@ss;TrustServerCertificate=True;Application Name=batch",
        )
        .unwrap();

    assert_eq!(config.driver, "mssql");
    assert_eq!(config.host, "db.internal");
    assert_eq!(config.port, 14330);
    assert_eq!(config.database.as_deref(), Some("orders"));
    assert_eq!(config.username.as_deref(), Some("app"));
    assert_eq!(config.password.as_deref(), Some("p@ss"));
    assert!(config.get_bool("trust_cert"));
    assert_eq!(config.params.get("application name").map(String::as_str), Some("batch"));
}

#[test]
fn test_parse_connection_string_without_port() {
    let config = MssqlDriver::new()
        .parse_connection_string("Data Source=localhost;Database=master")
        .unwrap();

    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 0);
}

#[test]
fn test_parse_connection_string_round_trips_build() {
    let driver = MssqlDriver::new();
    let original = ConnectionConfig::new_mssql("localhost", 1433, "testdb", "sa")
        .with_password("secret")
        .with_param("trust_cert", true);

    let parsed = driver
        .parse_connection_string(&driver.build_connection_string(&original))
        .unwrap();

    assert_eq!(parsed, original);
}

#[test]
fn test_parse_connection_string_errors() {
    let driver = MssqlDriver::new();

    assert!(matches!(
        driver.parse_connection_string("Database=master"),
        Err(DbHelperError::Configuration(_))
    ));
    assert!(matches!(
        driver.parse_connection_string("Server=localhost,abc"),
        Err(DbHelperError::Configuration(_))
    ));
    assert!(matches!(
        driver.parse_connection_string("Server=localhost;garbage"),
        Err(DbHelperError::Configuration(_))
    ));
}
