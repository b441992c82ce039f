//! Chunked transactional batch execution
//!
//! A batch is split into contiguous chunks of at most `chunk_size` commands.
//! Each chunk runs in its own transaction on a connection shared by the whole
//! batch, and chunks run strictly in order.

mod executor;

pub use executor::{
    BatchExecutor, BatchOutcome, DEFAULT_CHUNK_SIZE, FAILURE_SENTINEL, legacy_count,
};
