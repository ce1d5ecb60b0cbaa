//! Aggregation error types.

use thiserror::Error;

/// Result type for aggregation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Aggregation error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error (calibration, channel map).
    #[error("core error: {0}")]
    CoreError(#[from] tcspc_core::Error),

    /// Configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON for the expected schema.
    #[error("configuration parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A configured value is outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A control command was rejected.
    #[error(transparent)]
    Control(#[from] ControlError),
}

/// A rejected reconfiguration.
///
/// Each variant carries the value still in force so a front end can restore
/// its input field. Aggregation state is untouched when one is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    /// A width, window or edge was zero, negative or not a number.
    #[error("{setting} must be a positive number, got {value}; keeping {restored}")]
    NotPositive {
        /// Command name.
        setting: &'static str,
        /// Rejected input.
        value: f64,
        /// Value still in force.
        restored: f64,
    },

    /// A FRET edge was not a finite number.
    #[error("{setting} must be a finite number; keeping {restored}")]
    NotFinite {
        /// Command name.
        setting: &'static str,
        /// Value still in force.
        restored: f64,
    },

    /// The trace window would hold less than one bin.
    #[error(
        "trace window {window_ms} ms is shorter than the bin width {bin_width_ms} ms; keeping {restored_ms} ms"
    )]
    WindowShorterThanBin {
        /// Rejected window.
        window_ms: u32,
        /// Pending bin width.
        bin_width_ms: u32,
        /// Window still in force.
        restored_ms: u32,
    },

    /// The trace window would hold more bins than a window may allocate.
    #[error(
        "trace window {window_ms} ms in {bin_width_ms} ms bins needs {bin_count} bins, more than {max_bins}; keeping {restored_window_ms} ms in {restored_bin_width_ms} ms bins"
    )]
    TooManyBins {
        /// Requested window.
        window_ms: u32,
        /// Requested bin width.
        bin_width_ms: u32,
        /// Bins the request would need.
        bin_count: u64,
        /// Upper bound on bins per window.
        max_bins: usize,
        /// Window still in force.
        restored_window_ms: u32,
        /// Bin width still in force.
        restored_bin_width_ms: u32,
    },

    /// The command word is not recognised.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The command argument is missing or malformed.
    #[error("invalid argument for {command}: {reason}")]
    InvalidArgument {
        /// Command name.
        command: String,
        /// What was wrong.
        reason: String,
    },
}
