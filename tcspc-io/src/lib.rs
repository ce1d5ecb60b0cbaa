//! tcspc-io: Producer side of a live TCSPC stream.
//!
//! Bytes reach the decoder through a [`StreamBuffer`], filled either by a
//! [`FileTail`] following a file that is still being written or by a
//! [`PtuFileReader`] replaying a completed file through memmap2.
//!

pub mod buffer;
mod config;
mod error;
mod reader;
mod tail;

pub use buffer::{BufferAlert, BufferStats, StreamBuffer};
pub use config::{StartPosition, StreamConfig};
pub use error::{Error, Result};
pub use reader::{MappedFileReader, PtuFileReader};
pub use tail::{FileTail, PollOutcome};
