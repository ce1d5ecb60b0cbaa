//! tcspc-core: Core types for live TCSPC stream processing.
//!
//! This crate provides the calibration constants shared by the decoder and
//! the aggregators, the detector/series vocabulary, and the base error type.
//!

pub mod calibration;
pub mod channel;
pub mod error;

pub use calibration::{Calibration, MAX_MICRO_TIME, T3_WRAPAROUND};
pub use channel::{ChannelMap, Detector, TraceSeries};
pub use error::{Error, Result};
