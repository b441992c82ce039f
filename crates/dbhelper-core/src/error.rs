//! Error types for DBHelper

use thiserror::Error;

/// Core error type for DBHelper operations
#[derive(Error, Debug)]
pub enum DbHelperError {
    /// A connection could not be opened, or was used after being closed
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single command failed to execute
    #[error("Execution error: {0}")]
    Execution(String),

    /// A command that must affect rows affected none
    #[error("Command must affect at least one row: {command}")]
    Validation {
        /// Text of the offending command
        command: String,
    },

    /// A chunk of a batch was rolled back; no further chunks were attempted
    #[error("Chunk {chunk} aborted and rolled back: {source}")]
    ChunkAborted {
        /// Zero-based index of the aborted chunk. Chunks before it committed.
        chunk: usize,
        /// The failure that aborted the chunk
        #[source]
        source: Box<DbHelperError>,
    },

    /// Begin, commit or rollback failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DbHelperError {
    /// Whether this error came from the database while running a command,
    /// as opposed to connection, transaction or configuration problems
    pub fn is_command_error(&self) -> bool {
        matches!(self, Self::Execution(_) | Self::Validation { .. })
    }
}

/// Result type alias for DBHelper operations
pub type Result<T> = std::result::Result<T, DbHelperError>;
