//! Session configuration loaded from JSON.
//!
//! Every section and field is optional; missing values take the defaults of
//! the bench setup (1 ms trace bins over a 100 ms window, 64 ps histogram
//! bins, FRET window spanning the full 75 ns sync period but disabled).

use crate::trace::MAX_TRACE_BINS;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tcspc_core::ChannelMap;

/// Trace bin width and window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    /// Width of one trace bin in milliseconds.
    pub bin_width_ms: u32,
    /// Length of one trace window in milliseconds.
    pub window_ms: u32,
}

impl TraceSettings {
    /// Bins per window, counting a partial last bin and raising a window
    /// shorter than the bin to one bin.
    #[must_use]
    pub fn bin_count(&self) -> u64 {
        let bin_width_ms = self.bin_width_ms.max(1);
        u64::from(self.window_ms.max(bin_width_ms).div_ceil(bin_width_ms))
    }
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            bin_width_ms: 1,
            window_ms: 100,
        }
    }
}

/// Histogram bin width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramSettings {
    /// Requested bin width in picoseconds, quantized up to the measurement resolution.
    pub bin_width_ps: f64,
}

impl Default for HistogramSettings {
    fn default() -> Self {
        Self { bin_width_ps: 64.0 }
    }
}

/// FRET acceptance window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FretSettings {
    /// Lower edge in nanoseconds.
    pub low_ns: f64,
    /// Upper edge in nanoseconds.
    pub high_ns: f64,
    /// Route in-window acceptor photons to the transfer trace.
    pub enabled: bool,
}

impl Default for FretSettings {
    fn default() -> Self {
        Self {
            low_ns: 0.0,
            high_ns: crate::fret::FRET_WINDOW_MAX_NS,
            enabled: false,
        }
    }
}

/// Display flags carried in every frame. They never affect aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Visibility {
    pub green: bool,
    pub red: bool,
    pub transfer: bool,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            green: true,
            red: true,
            transfer: true,
        }
    }
}

impl Visibility {
    /// Flag for `series`.
    #[must_use]
    pub fn get(&self, series: tcspc_core::TraceSeries) -> bool {
        match series {
            tcspc_core::TraceSeries::Green => self.green,
            tcspc_core::TraceSeries::Red => self.red,
            tcspc_core::TraceSeries::Transfer => self.transfer,
        }
    }

    /// Sets the flag for `series`.
    pub fn set(&mut self, series: tcspc_core::TraceSeries, visible: bool) {
        match series {
            tcspc_core::TraceSeries::Green => self.green = visible,
            tcspc_core::TraceSeries::Red => self.red = visible,
            tcspc_core::TraceSeries::Transfer => self.transfer = visible,
        }
    }
}

/// Initial settings of an acquisition session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub trace: TraceSettings,
    pub histogram: HistogramSettings,
    pub fret: FretSettings,
    pub channels: ChannelMap,
    pub visibility: Visibility,
}

impl SessionConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// holds out-of-range values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string is not valid JSON or holds
    /// out-of-range values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value is in range.
    ///
    /// FRET edges are not checked here; the classifier clamps them.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for a zero trace bin or window, a
    /// window shorter than the bin, a non-positive histogram bin, or an
    /// invalid channel map.
    pub fn validate(&self) -> Result<()> {
        if self.trace.bin_width_ms == 0 {
            return Err(Error::InvalidConfig(
                "trace.bin_width_ms must be at least 1".to_string(),
            ));
        }
        if self.trace.window_ms < self.trace.bin_width_ms {
            return Err(Error::InvalidConfig(format!(
                "trace.window_ms ({}) is shorter than trace.bin_width_ms ({})",
                self.trace.window_ms, self.trace.bin_width_ms
            )));
        }
        let bin_count = self.trace.bin_count();
        if bin_count > MAX_TRACE_BINS as u64 {
            return Err(Error::InvalidConfig(format!(
                "trace window of {} ms in {} ms bins needs {bin_count} bins, more than {MAX_TRACE_BINS}",
                self.trace.window_ms, self.trace.bin_width_ms
            )));
        }
        let bin_ps = self.histogram.bin_width_ps;
        if !(bin_ps.is_finite() && bin_ps > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "histogram.bin_width_ps must be positive, got {bin_ps}"
            )));
        }
        if self.fret.low_ns.is_nan() || self.fret.high_ns.is_nan() {
            return Err(Error::InvalidConfig(
                "fret edges must be numbers".to_string(),
            ));
        }
        self.channels.validate()?;
        Ok(())
    }
}
