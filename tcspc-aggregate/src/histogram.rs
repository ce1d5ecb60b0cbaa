//! Cumulative micro-time histogram per detector.

use crate::error::ControlError;
use serde::Serialize;
use tcspc_core::{Calibration, Detector, MAX_MICRO_TIME};

/// Tolerance when comparing a requested width against a multiple of the resolution.
const QUANTIZE_EPSILON: f64 = 1e-9;

/// Bin geometry derived from a requested width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramLayout {
    /// Micro-time ticks per bin.
    pub bin_multiple: u32,
    /// Effective width: `bin_multiple * resolution_ps`.
    pub bin_width_ps: f64,
    /// `ceil(MAX_MICRO_TIME / bin_multiple)`.
    pub bin_count: usize,
}

impl HistogramLayout {
    /// Quantizes `bin_width_ps` up to a whole number of `resolution_ps` ticks.
    ///
    /// At 4 ps resolution a 64 ps request gives 16 ticks per bin and 2048 bins.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(resolution_ps: f64, bin_width_ps: f64) -> Self {
        let ratio = bin_width_ps / resolution_ps;
        let bin_multiple = ((ratio - QUANTIZE_EPSILON).ceil().max(1.0) as u32).min(MAX_MICRO_TIME);
        Self {
            bin_multiple,
            bin_width_ps: f64::from(bin_multiple) * resolution_ps,
            bin_count: MAX_MICRO_TIME.div_ceil(bin_multiple) as usize,
        }
    }

    /// Bin index of `micro_time`, or `None` if it falls outside the histogram.
    ///
    /// Bin `i` covers ticks `[(i + 1) * m, (i + 2) * m)`, so micro-times below
    /// one bin width have no bin.
    #[inline]
    #[must_use]
    pub fn index(&self, micro_time: u16) -> Option<usize> {
        let slot = (u32::from(micro_time) / self.bin_multiple) as usize;
        slot.checked_sub(1).filter(|&i| i < self.bin_count)
    }

    /// Bin centres in nanoseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn axis_ns(&self) -> Vec<f64> {
        let width_ns = self.bin_width_ps * 1e-3;
        (0..self.bin_count)
            .map(|i| (i as f64 + 1.5) * width_ns)
            .collect()
    }
}

/// Histogram contents handed to a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramFrame {
    pub bin_width_ps: f64,
    /// Bin centres in nanoseconds.
    pub axis_ns: Vec<f64>,
    pub green: Vec<u64>,
    pub red: Vec<u64>,
}

impl HistogramFrame {
    /// Counts for `detector`.
    #[must_use]
    pub fn detector(&self, detector: Detector) -> &[u64] {
        match detector {
            Detector::Donor => &self.green,
            Detector::Acceptor => &self.red,
        }
    }
}

/// Micro-time histogram accumulated over the whole run.
///
/// A new bin width is staged by [`HistogramAggregator::reconfigure`] and swapped
/// in by [`HistogramAggregator::apply_pending`], which discards prior counts.
#[derive(Debug, Clone)]
pub struct HistogramAggregator {
    resolution_ps: f64,
    layout: HistogramLayout,
    pending: Option<HistogramLayout>,
    counts: [Vec<u64>; 2],
    axis_ns: Vec<f64>,
}

impl HistogramAggregator {
    /// Creates an empty histogram with bins of about `bin_width_ps`.
    ///
    /// # Errors
    /// Returns [`ControlError::NotPositive`] if the width is not a positive number.
    pub fn new(calibration: &Calibration, bin_width_ps: f64) -> Result<Self, ControlError> {
        let resolution_ps = calibration.measurement_resolution_ps();
        if !(bin_width_ps.is_finite() && bin_width_ps > 0.0) {
            return Err(ControlError::NotPositive {
                setting: "hist.bin",
                value: bin_width_ps,
                restored: resolution_ps,
            });
        }
        let layout = HistogramLayout::new(resolution_ps, bin_width_ps);
        Ok(Self {
            resolution_ps,
            layout,
            pending: None,
            counts: std::array::from_fn(|_| vec![0; layout.bin_count]),
            axis_ns: layout.axis_ns(),
        })
    }

    /// Geometry in force.
    #[must_use]
    pub fn layout(&self) -> &HistogramLayout {
        &self.layout
    }

    /// Geometry staged for the next flush, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&HistogramLayout> {
        self.pending.as_ref()
    }

    /// Counts for `detector`.
    #[must_use]
    pub fn counts(&self, detector: Detector) -> &[u64] {
        &self.counts[detector.index()]
    }

    /// Bin centres in nanoseconds.
    #[must_use]
    pub fn axis_ns(&self) -> &[f64] {
        &self.axis_ns
    }

    /// Counts one photon. Returns `false` if it fell outside the histogram.
    #[inline]
    pub fn record(&mut self, detector: Detector, micro_time: u16) -> bool {
        match self.layout.index(micro_time) {
            Some(i) => {
                self.counts[detector.index()][i] += 1;
                true
            }
            None => false,
        }
    }

    /// Stages a new bin width and returns the quantized width that will apply.
    ///
    /// Asking for the width already in force cancels any staged change.
    ///
    /// # Errors
    /// Returns [`ControlError::NotPositive`] if the width is not a positive number.
    pub fn reconfigure(&mut self, bin_width_ps: f64) -> Result<f64, ControlError> {
        if !(bin_width_ps.is_finite() && bin_width_ps > 0.0) {
            let staged = self.pending.as_ref().unwrap_or(&self.layout);
            return Err(ControlError::NotPositive {
                setting: "hist.bin",
                value: bin_width_ps,
                restored: staged.bin_width_ps,
            });
        }
        let layout = HistogramLayout::new(self.resolution_ps, bin_width_ps);
        self.pending = (layout.bin_multiple != self.layout.bin_multiple).then_some(layout);
        Ok(layout.bin_width_ps)
    }

    /// Swaps in the staged geometry, discarding all counts. Returns `true` if a change applied.
    pub fn apply_pending(&mut self) -> bool {
        let Some(layout) = self.pending.take() else {
            return false;
        };
        log::info!(
            "histogram re-binned: {:.1} ps -> {:.1} ps ({} bins), counts discarded",
            self.layout.bin_width_ps,
            layout.bin_width_ps,
            layout.bin_count
        );
        self.layout = layout;
        self.counts = std::array::from_fn(|_| vec![0; layout.bin_count]);
        self.axis_ns = layout.axis_ns();
        true
    }

    /// Clears all counts, keeping the geometry.
    pub fn reset(&mut self) {
        for counts in &mut self.counts {
            counts.fill(0);
        }
    }

    /// Copies the current contents into a frame.
    #[must_use]
    pub fn snapshot(&self) -> HistogramFrame {
        HistogramFrame {
            bin_width_ps: self.layout.bin_width_ps,
            axis_ns: self.axis_ns.clone(),
            green: self.counts(Detector::Donor).to_vec(),
            red: self.counts(Detector::Acceptor).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calibration() -> Calibration {
        Calibration::new(4e-12, 75e-9).unwrap()
    }

    #[test]
    fn test_64ps_at_4ps_resolution() {
        let layout = HistogramLayout::new(4.0, 64.0);
        assert_eq!(layout.bin_multiple, 16);
        assert_eq!(layout.bin_count, 2048);
        assert_relative_eq!(layout.bin_width_ps, 64.0);
    }

    #[test]
    fn test_width_quantized_up() {
        let layout = HistogramLayout::new(4.0, 50.0);
        assert_eq!(layout.bin_multiple, 13);
        assert_relative_eq!(layout.bin_width_ps, 52.0);
        // below one tick still gives one tick
        assert_eq!(HistogramLayout::new(4.0, 1.0).bin_multiple, 1);
    }

    #[test]
    fn test_index_offset_and_bounds() {
        let layout = HistogramLayout::new(4.0, 64.0);
        assert_eq!(layout.index(0), None);
        assert_eq!(layout.index(15), None);
        assert_eq!(layout.index(16), Some(0));
        assert_eq!(layout.index(31), Some(0));
        assert_eq!(layout.index(32), Some(1));
        // the largest micro-time lands in the last bin
        assert_eq!(layout.index(32767), Some(2046));
    }

    #[test]
    fn test_axis_centres() {
        let layout = HistogramLayout::new(4.0, 64.0);
        let axis = layout.axis_ns();
        assert_eq!(axis.len(), 2048);
        assert_relative_eq!(axis[0], 0.096, epsilon = 1e-12);
        assert_relative_eq!(axis[1], 0.160, epsilon = 1e-12);
    }

    #[test]
    fn test_calibrated_resolution_quantizes_cleanly() {
        // 4e-12 * 1e12 is not exactly 4.0 in binary floating point
        let hist = HistogramAggregator::new(&calibration(), 64.0).unwrap();
        assert_eq!(hist.layout().bin_multiple, 16);
        assert_eq!(hist.layout().bin_count, 2048);
    }

    #[test]
    fn test_out_of_range_never_writes() {
        let mut hist = HistogramAggregator::new(&calibration(), 64.0).unwrap();
        assert!(!hist.record(Detector::Donor, 3));
        assert_eq!(hist.counts(Detector::Donor).iter().sum::<u64>(), 0);
        assert!(hist.record(Detector::Donor, 3750));
        assert_eq!(hist.counts(Detector::Donor)[233], 1);
        assert_eq!(hist.counts(Detector::Acceptor).iter().sum::<u64>(), 0);
    }

    #[test]
    fn test_rebin_is_deferred_and_discards() {
        let mut hist = HistogramAggregator::new(&calibration(), 64.0).unwrap();
        hist.record(Detector::Acceptor, 100);

        assert_relative_eq!(hist.reconfigure(128.0).unwrap(), 128.0, epsilon = 1e-9);
        assert_eq!(hist.layout().bin_count, 2048);
        assert_eq!(hist.counts(Detector::Acceptor).iter().sum::<u64>(), 1);

        assert!(hist.apply_pending());
        assert_eq!(hist.layout().bin_multiple, 32);
        assert_eq!(hist.layout().bin_count, 1024);
        assert_eq!(hist.axis_ns().len(), 1024);
        assert_eq!(hist.counts(Detector::Acceptor).iter().sum::<u64>(), 0);
        assert!(!hist.apply_pending());
    }

    #[test]
    fn test_same_width_is_noop() {
        let mut hist = HistogramAggregator::new(&calibration(), 64.0).unwrap();
        hist.record(Detector::Donor, 100);
        hist.reconfigure(62.0).unwrap();
        assert!(hist.pending().is_none());
        assert!(!hist.apply_pending());
        assert_eq!(hist.counts(Detector::Donor).iter().sum::<u64>(), 1);
    }

    #[test]
    fn test_invalid_width_keeps_layout() {
        let mut hist = HistogramAggregator::new(&calibration(), 64.0).unwrap();
        assert!(matches!(
            hist.reconfigure(f64::NAN),
            Err(ControlError::NotPositive { .. })
        ));
        assert!(hist.reconfigure(-1.0).is_err());
        assert!(hist.pending().is_none());
    }

    #[test]
    fn test_reset_keeps_geometry() {
        let mut hist = HistogramAggregator::new(&calibration(), 64.0).unwrap();
        hist.record(Detector::Donor, 100);
        hist.reset();
        assert_eq!(hist.layout().bin_count, 2048);
        assert_eq!(hist.counts(Detector::Donor).iter().sum::<u64>(), 0);
    }
}
