//! SQLite database driver implementation

mod connection;
mod dialect;
mod driver;

pub use connection::{SqliteConnection, SqliteTransaction};
pub use dialect::SqliteDialect;
pub use driver::SqliteDriver;
