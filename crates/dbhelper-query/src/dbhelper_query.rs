//! DBHelper Query - Batch execution and the helper facade
//!
//! - [`BatchExecutor`] runs an ordered [`dbhelper_core::Batch`] as a sequence
//!   of independently committed chunks on one connection.
//! - [`DbHelper`] wraps a connection factory and a dialect with the one-shot
//!   operations (non-query, procedure, query, scalar) and SQL templating.

pub mod batch;
mod helper;

pub use batch::{BatchExecutor, BatchOutcome, DEFAULT_CHUNK_SIZE, FAILURE_SENTINEL, legacy_count};
pub use helper::DbHelper;
