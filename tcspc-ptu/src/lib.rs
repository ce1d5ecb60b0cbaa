//! tcspc-ptu: PicoQuant PTU header reader and T3 record decoder.
//!
//! # Key Components
//!
//! - [`T3Record`] - Bit field extraction for one 32-bit record
//! - [`T3Event`] - Decoded record: photon, overflow or external marker
//! - [`PtuHeader`] - Tag directory reader yielding the [`Calibration`]
//!
//! The decoder is stateless. Reconstructing macro-time from overflow
//! markers is the caller's job (see `tcspc-aggregate`).

mod error;
pub mod header;
mod record;

pub use error::{Error, Result};
pub use header::{PtuHeader, Tag, TagValue, PTU_MAGIC};
pub use record::{RecordFormat, T3Event, T3Record, RECORD_SIZE};

// Re-export core types for convenience
pub use tcspc_core::Calibration;
