//! Counters reported with every frame.

use serde::Serialize;

/// Events that reached the aggregators but were not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounters {
    /// Photons whose trace bin index fell outside the window.
    pub trace_out_of_range: u64,
    /// Photons whose micro-time fell outside the histogram.
    pub histogram_out_of_range: u64,
    /// Photons on channels not mapped to a detector.
    pub ignored_photons: u64,
}

impl DropCounters {
    /// Sum of all dropped photons.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.trace_out_of_range + self.histogram_out_of_range + self.ignored_photons
    }
}

/// Records seen by the session, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounters {
    /// All records processed.
    pub records: u64,
    /// Photon records, including ignored channels.
    pub photons: u64,
    /// Overflow records.
    pub overflows: u64,
    /// Overflow units accumulated across all windows.
    pub overflow_units: u64,
    /// External marker records.
    pub markers: u64,
}

impl RecordCounters {
    /// Elapsed measurement time implied by the overflow units.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed_s(&self, overflow_period_s: f64) -> f64 {
        self.overflow_units as f64 * overflow_period_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_drop_total() {
        let drops = DropCounters {
            trace_out_of_range: 1,
            histogram_out_of_range: 2,
            ignored_photons: 3,
        };
        assert_eq!(drops.total(), 6);
        assert_eq!(DropCounters::default().total(), 0);
    }

    #[test]
    fn test_elapsed_time() {
        let counters = RecordCounters {
            overflow_units: 13_000,
            ..RecordCounters::default()
        };
        // 75 ns sync: one unit is 76.8 us
        assert_relative_eq!(counters.elapsed_s(1024.0 * 75e-9), 0.9984, epsilon = 1e-9);
    }
}
