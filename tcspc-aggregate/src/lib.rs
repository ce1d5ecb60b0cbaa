//! tcspc-aggregate: Live trace and micro-time histogram aggregation.
//!
//! # Key Components
//!
//! - [`Session`] - Owns the overflow count and every aggregator; runs the window state machine
//! - [`TraceAggregator`] - Sliding macro-time trace with [`IndexedTrace`] and [`RollingTrace`] disciplines
//! - [`HistogramAggregator`] - Cumulative micro-time histogram per detector
//! - [`FretClassifier`] - Routes in-window acceptor photons to the transfer series
//! - [`ControlCommand`] - Operator reconfiguration, parseable from text
//!
//! # Example
//!
//! ```ignore
//! use tcspc_aggregate::{FrameCollector, Session, SessionConfig};
//! use tcspc_io::{PtuFileReader, StreamBuffer};
//!
//! let file = PtuFileReader::open("measurement.ptu")?;
//! let mut session = Session::new(file.header().calibration()?, &SessionConfig::default())?;
//! let mut buffer = StreamBuffer::new(1 << 20);
//! let mut sink = FrameCollector::default();
//! for chunk in file.chunks(1 << 16) {
//!     buffer.extend_from_slice(chunk);
//!     session.step(&mut buffer, &mut sink);
//! }
//! session.drain(&mut buffer, &mut sink);
//! ```

pub mod config;
pub mod control;
mod error;
pub mod fret;
pub mod histogram;
pub mod session;
mod stats;
pub mod trace;

pub use config::{FretSettings, HistogramSettings, SessionConfig, TraceSettings, Visibility};
pub use control::ControlCommand;
pub use error::{ControlError, Error, Result};
pub use fret::{FretClassifier, FRET_WINDOW_MAX_NS};
pub use histogram::{HistogramAggregator, HistogramFrame, HistogramLayout};
pub use session::{
    FrameCollector, FrameSink, RecordOutcome, Session, StepOutcome, WindowFrame, WindowState,
};
pub use stats::{DropCounters, RecordCounters};
pub use trace::{
    IndexedTrace, RollingTrace, TraceAggregator, TraceBinningStrategy, TraceBins, TraceFrame,
    TraceLayout, TraceMode, MAX_TRACE_BINS, ROLLING_MIN_BIN_MS,
};
