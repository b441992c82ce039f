//! DBHelper Core - Core abstractions shared by the executor and the drivers
//!
//! This crate provides the fundamental traits and types that every other
//! DBHelper crate depends on. It defines:
//!
//! - `Command` / `Batch` - The unit of work and the ordered request
//! - `Connection` / `Transaction` - Traits a backend implements
//! - `ConnectionFactory` - Opens connections from preconfigured settings
//! - `DatabaseDriver` - Per-backend entry point (connection + dialect)
//! - `SqlDialect` - Dialect-specific SQL templating hooks
//! - Common types like `Value`, `Row`, `QueryResult`

mod command;
mod config;
mod connection;
mod dialect;
mod driver;
mod error;
mod types;

pub use command::*;
pub use config::*;
pub use connection::*;
pub use dialect::*;
pub use driver::*;
pub use error::*;
pub use types::*;
