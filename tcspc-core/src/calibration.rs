//! Calibration constants taken from the PTU header.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of sync periods covered by one T3 macro-time wrap (10-bit nsync).
pub const T3_WRAPAROUND: u64 = 1024;

/// Largest micro-time (dtime) value a T3 record can carry (15 bits).
pub const MAX_MICRO_TIME: u32 = (1 << 15) - 1;

/// Timing calibration of a measurement.
///
/// Both values come from the file header: `MeasDesc_Resolution` gives the
/// duration of one micro-time tick, `MeasDesc_GlobalResolution` (or the
/// inverse of `TTResult_SyncRate`) gives the sync period.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Calibration {
    measurement_resolution_s: f64,
    global_resolution_s: f64,
}

impl Calibration {
    /// Creates a calibration from the micro-time tick and the sync period, both in seconds.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCalibration`] if either value is not finite and positive.
    pub fn new(measurement_resolution_s: f64, global_resolution_s: f64) -> Result<Self> {
        validate("measurement resolution", measurement_resolution_s)?;
        validate("global resolution", global_resolution_s)?;
        Ok(Self {
            measurement_resolution_s,
            global_resolution_s,
        })
    }

    /// Creates a calibration from the micro-time tick (seconds) and the sync rate (Hz).
    ///
    /// # Errors
    /// Returns [`Error::InvalidCalibration`] if either value is not finite and positive.
    pub fn from_sync_rate(measurement_resolution_s: f64, sync_rate_hz: f64) -> Result<Self> {
        validate("sync rate", sync_rate_hz)?;
        Self::new(measurement_resolution_s, 1.0 / sync_rate_hz)
    }

    /// Duration of one micro-time tick in seconds.
    #[must_use]
    pub fn measurement_resolution_s(&self) -> f64 {
        self.measurement_resolution_s
    }

    /// Duration of one micro-time tick in picoseconds.
    #[must_use]
    pub fn measurement_resolution_ps(&self) -> f64 {
        self.measurement_resolution_s * 1e12
    }

    /// Sync period in seconds.
    #[must_use]
    pub fn global_resolution_s(&self) -> f64 {
        self.global_resolution_s
    }

    /// Sync rate in Hz.
    #[must_use]
    pub fn sync_rate_hz(&self) -> f64 {
        1.0 / self.global_resolution_s
    }

    /// Duration of one overflow unit (a full nsync wrap) in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn overflow_period_s(&self) -> f64 {
        self.global_resolution_s * T3_WRAPAROUND as f64
    }

    /// Number of overflow units elapsing per millisecond.
    ///
    /// At a 75 ns sync period this is ~13.02.
    #[must_use]
    pub fn overflows_per_ms(&self) -> f64 {
        1e-3 / self.overflow_period_s()
    }

    /// Number of overflow units covering `bin_width_ms`, never less than one.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn overflow_units_for_ms(&self, bin_width_ms: u32) -> u64 {
        let units = (f64::from(bin_width_ms) * self.overflows_per_ms()).round();
        (units as u64).max(1)
    }

    /// Converts a micro-time tick count to nanoseconds.
    #[must_use]
    pub fn micro_time_ns(&self, micro_time: u16) -> f64 {
        f64::from(micro_time) * self.measurement_resolution_s * 1e9
    }
}

fn validate(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidCalibration(format!(
            "{name} must be finite and positive, got {value}"
        )))
    }
}
