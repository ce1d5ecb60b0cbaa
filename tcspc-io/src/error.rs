//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// The tailed file shrank below the read position.
    #[error("file truncated to {len} bytes while reading at offset {position}")]
    Truncated {
        /// Current read offset.
        position: u64,
        /// Observed file length.
        len: u64,
    },

    /// Invalid stream configuration.
    #[error("invalid stream configuration: {0}")]
    InvalidConfig(String),

    /// PTU header or record error.
    #[error("PTU error: {0}")]
    Ptu(#[from] tcspc_ptu::Error),
}
