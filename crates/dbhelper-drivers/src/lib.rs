//! DBHelper Drivers - Database driver implementations
//!
//! This crate bundles the concrete drivers behind cargo features and exposes
//! a [`DriverRegistry`] that resolves a [`ConnectionConfig`] to a connector.

#[cfg(feature = "mssql")]
pub use dbhelper_driver_mssql as mssql;
#[cfg(feature = "sqlite")]
pub use dbhelper_driver_sqlite as sqlite;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from dbhelper-core
pub use dbhelper_core::{
    ConfiguredConnector, Connection, ConnectionConfig, ConnectionFactory, DatabaseDriver,
    DbHelperError, QueryResult, Result, Row, SqlDialect, StatementResult, Transaction, Value,
};
