//! FRET acceptance-window classifier.

use crate::config::FretSettings;
use crate::error::ControlError;
use tcspc_core::{Detector, TraceSeries};

/// Upper bound of the acceptance window in nanoseconds (one 13.33 MHz sync period).
pub const FRET_WINDOW_MAX_NS: f64 = 75.0;

/// Routes acceptor photons whose micro-time falls in `[low, high]` to the transfer trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FretClassifier {
    low_ns: f64,
    high_ns: f64,
    enabled: bool,
}

impl Default for FretClassifier {
    fn default() -> Self {
        Self::new(&FretSettings::default())
    }
}

impl FretClassifier {
    /// Creates a classifier, clamping the edges into `[0, 75]` ns with `low <= high`.
    #[must_use]
    pub fn new(settings: &FretSettings) -> Self {
        let high_ns = clamp_edge(settings.high_ns);
        let low_ns = clamp_edge(settings.low_ns).min(high_ns);
        Self {
            low_ns,
            high_ns,
            enabled: settings.enabled,
        }
    }

    /// Lower edge in nanoseconds.
    #[must_use]
    pub fn low_ns(&self) -> f64 {
        self.low_ns
    }

    /// Upper edge in nanoseconds.
    #[must_use]
    pub fn high_ns(&self) -> f64 {
        self.high_ns
    }

    /// Returns true if the transfer series is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> FretSettings {
        FretSettings {
            low_ns: self.low_ns,
            high_ns: self.high_ns,
            enabled: self.enabled,
        }
    }

    /// Sets the lower edge and returns the value applied after clamping.
    ///
    /// # Errors
    /// Returns [`ControlError::NotFinite`] for NaN or an infinite value.
    pub fn set_low_ns(&mut self, low_ns: f64) -> Result<f64, ControlError> {
        if !low_ns.is_finite() {
            return Err(ControlError::NotFinite {
                setting: "fret.low",
                restored: self.low_ns,
            });
        }
        self.low_ns = clamp_edge(low_ns).min(self.high_ns);
        Ok(self.low_ns)
    }

    /// Sets the upper edge and returns the value applied after clamping.
    ///
    /// # Errors
    /// Returns [`ControlError::NotFinite`] for NaN or an infinite value.
    pub fn set_high_ns(&mut self, high_ns: f64) -> Result<f64, ControlError> {
        if !high_ns.is_finite() {
            return Err(ControlError::NotFinite {
                setting: "fret.high",
                restored: self.high_ns,
            });
        }
        self.high_ns = clamp_edge(high_ns).max(self.low_ns);
        Ok(self.high_ns)
    }

    /// Enables or disables the transfer series.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Trace series a photon from `detector` at `micro_time_ns` is counted in.
    #[inline]
    #[must_use]
    pub fn classify(&self, detector: Detector, micro_time_ns: f64) -> TraceSeries {
        if detector == Detector::Acceptor
            && self.enabled
            && (self.low_ns..=self.high_ns).contains(&micro_time_ns)
        {
            TraceSeries::Transfer
        } else {
            detector.raw_series()
        }
    }
}

fn clamp_edge(ns: f64) -> f64 {
    if ns.is_nan() {
        0.0
    } else {
        ns.clamp(0.0, FRET_WINDOW_MAX_NS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(low_ns: f64, high_ns: f64) -> FretClassifier {
        FretClassifier::new(&FretSettings {
            low_ns,
            high_ns,
            enabled: true,
        })
    }

    #[test]
    fn test_default_is_full_window_disabled() {
        let fret = FretClassifier::default();
        assert_eq!(fret.low_ns(), 0.0);
        assert_eq!(fret.high_ns(), 75.0);
        assert!(!fret.is_enabled());
        assert_eq!(fret.classify(Detector::Acceptor, 30.0), TraceSeries::Red);
    }

    #[test]
    fn test_acceptor_in_window_is_transfer() {
        let fret = window(10.0, 20.0);
        assert_eq!(fret.classify(Detector::Acceptor, 15.0), TraceSeries::Transfer);
        assert_eq!(fret.classify(Detector::Acceptor, 10.0), TraceSeries::Transfer);
        assert_eq!(fret.classify(Detector::Acceptor, 20.0), TraceSeries::Transfer);
        assert_eq!(fret.classify(Detector::Acceptor, 25.0), TraceSeries::Red);
        assert_eq!(fret.classify(Detector::Acceptor, 9.9), TraceSeries::Red);
    }

    #[test]
    fn test_donor_never_transfers() {
        let fret = window(0.0, 75.0);
        assert_eq!(fret.classify(Detector::Donor, 15.0), TraceSeries::Green);
    }

    #[test]
    fn test_edges_clamp() {
        let mut fret = window(10.0, 20.0);
        assert_eq!(fret.set_high_ns(100.0).unwrap(), 75.0);
        assert_eq!(fret.set_low_ns(-3.0).unwrap(), 0.0);

        // An edge may not cross the other
        let mut fret = window(10.0, 20.0);
        assert_eq!(fret.set_low_ns(30.0).unwrap(), 20.0);
        assert_eq!(fret.set_high_ns(5.0).unwrap(), 20.0);
    }

    #[test]
    fn test_nan_edge_rejected() {
        let mut fret = window(10.0, 20.0);
        assert_eq!(
            fret.set_low_ns(f64::NAN),
            Err(ControlError::NotFinite {
                setting: "fret.low",
                restored: 10.0
            })
        );
        assert_eq!(fret.low_ns(), 10.0);
    }

    #[test]
    fn test_constructor_orders_edges() {
        let fret = window(50.0, 20.0);
        assert_eq!(fret.low_ns(), 20.0);
        assert_eq!(fret.high_ns(), 20.0);
    }
}
