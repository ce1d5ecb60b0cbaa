//! Error types for tcspc-core.

use thiserror::Error;

/// Result type alias for tcspc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Calibration constant missing, non-finite or non-positive.
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    /// Channel assignment error.
    #[error("invalid channel map: {0}")]
    InvalidChannelMap(String),
}
