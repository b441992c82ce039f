//! SQL Server driver for DBHelper
//!
//! Talks TDS through tiberius. Text commands bind parameters positionally as
//! `@P1..@Pn`; stored procedures are sent as `EXEC` batches built by
//! [`MssqlDialect`].

mod connection;
mod dialect;
mod driver;

#[cfg(test)]
mod connection_tests;
#[cfg(test)]
mod dialect_tests;
#[cfg(test)]
mod driver_tests;

pub use connection::{MssqlConnection, MssqlConnectionError, MssqlTransaction};
pub use dialect::MssqlDialect;
pub use driver::MssqlDriver;
