//! PTU-specific error types.

use thiserror::Error;

/// Result type for PTU operations.
pub type Result<T> = std::result::Result<T, Error>;

/// PTU-specific error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File does not start with the `PQTTTR` magic.
    #[error("invalid magic: expected \"PQTTTR\", found {0:?}")]
    InvalidMagic(String),

    /// Tag directory entry with a type code this reader does not know.
    #[error("unknown tag type {type_code:#010x} for tag {tag:?}")]
    UnknownTagType { tag: String, type_code: u32 },

    /// Tag value that cannot be interpreted.
    #[error("invalid value for tag {tag:?}: {reason}")]
    InvalidTagValue { tag: String, reason: String },

    /// A tag required to start aggregation is absent.
    #[error("missing header tag: {0}")]
    MissingTag(&'static str),

    /// Record type whose bit layout is not the generic T3 layout.
    #[error("unsupported record type: {0:#010x}")]
    UnsupportedRecordType(u32),

    /// The header ended before `Header_End`.
    #[error("truncated header: {0}")]
    TruncatedHeader(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] tcspc_core::Error),
}
