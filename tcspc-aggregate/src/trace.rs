//! Sliding macro-time trace.
//!
//! A window spans `bin_count` bins of `overflow_units_per_bin` overflow units
//! each. Short bins are addressed directly by the overflow count
//! ([`IndexedTrace`]); long bins use a ring that counts into its last slot
//! and shifts left as each bin boundary passes ([`RollingTrace`]), so a
//! display can scroll between window flushes. Both leave the same layout at
//! the end of a window.

use crate::config::TraceSettings;
use crate::error::ControlError;
use serde::Serialize;
use tcspc_core::{Calibration, TraceSeries};

/// Bin widths at or above this use the rolling discipline.
pub const ROLLING_MIN_BIN_MS: u32 = 100;

/// Upper bound on bins per window (100 s of 1 ms bins).
pub const MAX_TRACE_BINS: usize = 100_000;

/// Update discipline of the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    /// Bin addressed by `ofl / overflow_units_per_bin`.
    Indexed,
    /// Counts go to the last slot; the ring shifts at each bin boundary.
    Rolling,
}

impl TraceMode {
    /// Discipline used for `bin_width_ms`.
    #[must_use]
    pub fn for_bin_width(bin_width_ms: u32) -> Self {
        if bin_width_ms < ROLLING_MIN_BIN_MS {
            TraceMode::Indexed
        } else {
            TraceMode::Rolling
        }
    }
}

/// Bin layout of one window, fixed while it accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceLayout {
    pub bin_width_ms: u32,
    pub window_ms: u32,
    pub bin_count: usize,
    pub overflow_units_per_bin: u64,
    pub mode: TraceMode,
}

impl TraceLayout {
    /// Derives the layout from settings. A window shorter than the bin is raised to the bin.
    #[must_use]
    pub fn new(calibration: &Calibration, settings: TraceSettings) -> Self {
        let bin_width_ms = settings.bin_width_ms.max(1);
        let window_ms = settings.window_ms.max(bin_width_ms);
        Self {
            bin_width_ms,
            window_ms,
            bin_count: window_ms.div_ceil(bin_width_ms) as usize,
            overflow_units_per_bin: calibration.overflow_units_for_ms(bin_width_ms),
            mode: TraceMode::for_bin_width(bin_width_ms),
        }
    }

    /// Overflow units after which the window is complete.
    #[must_use]
    pub fn threshold(&self) -> u64 {
        self.overflow_units_per_bin * self.bin_count as u64
    }

    /// Bin start times in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn axis_s(&self) -> Vec<f64> {
        let width_s = f64::from(self.bin_width_ms) * 1e-3;
        (0..self.bin_count).map(|i| i as f64 * width_s).collect()
    }
}

/// Per-series bin storage shared by both disciplines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceBins {
    series: [Vec<u64>; 3],
}

impl TraceBins {
    fn zeroed(bin_count: usize) -> Self {
        Self {
            series: std::array::from_fn(|_| vec![0; bin_count]),
        }
    }

    /// Counts for `series`.
    #[must_use]
    pub fn get(&self, series: TraceSeries) -> &[u64] {
        &self.series[series.index()]
    }

    /// Number of bins per series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series[0].len()
    }

    /// Returns true if there are no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total counts over all series.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.series.iter().flatten().sum()
    }

    fn clear(&mut self) {
        for bins in &mut self.series {
            bins.fill(0);
        }
    }
}

/// Update discipline for the trace bins of one window.
pub trait TraceBinningStrategy: Send {
    /// Counts one photon of `series` at `ofl_units` into the window.
    ///
    /// Returns `false` if the photon fell outside the window and was dropped.
    fn record(&mut self, series: TraceSeries, ofl_units: u64) -> bool;

    /// Called once per bin boundary crossed inside the window.
    fn advance(&mut self);

    /// Current bin contents.
    fn snapshot(&self) -> &TraceBins;

    /// Zeroes every bin.
    fn reset(&mut self);

    /// Discipline implemented.
    fn mode(&self) -> TraceMode;
}

/// Direct addressing by overflow count, for bins shorter than [`ROLLING_MIN_BIN_MS`].
#[derive(Debug)]
pub struct IndexedTrace {
    bins: TraceBins,
    overflow_units_per_bin: u64,
}

impl IndexedTrace {
    #[must_use]
    pub fn new(bin_count: usize, overflow_units_per_bin: u64) -> Self {
        Self {
            bins: TraceBins::zeroed(bin_count),
            overflow_units_per_bin: overflow_units_per_bin.max(1),
        }
    }
}

impl TraceBinningStrategy for IndexedTrace {
    #[inline]
    fn record(&mut self, series: TraceSeries, ofl_units: u64) -> bool {
        let index = ofl_units / self.overflow_units_per_bin;
        match usize::try_from(index)
            .ok()
            .and_then(|i| self.bins.series[series.index()].get_mut(i))
        {
            Some(bin) => {
                *bin += 1;
                true
            }
            None => false,
        }
    }

    fn advance(&mut self) {}

    fn snapshot(&self) -> &TraceBins {
        &self.bins
    }

    fn reset(&mut self) {
        self.bins.clear();
    }

    fn mode(&self) -> TraceMode {
        TraceMode::Indexed
    }
}

/// Fixed-length ring counting into its last slot.
#[derive(Debug)]
pub struct RollingTrace {
    bins: TraceBins,
}

impl RollingTrace {
    #[must_use]
    pub fn new(bin_count: usize) -> Self {
        Self {
            bins: TraceBins::zeroed(bin_count.max(1)),
        }
    }
}

impl TraceBinningStrategy for RollingTrace {
    #[inline]
    fn record(&mut self, series: TraceSeries, _ofl_units: u64) -> bool {
        match self.bins.series[series.index()].last_mut() {
            Some(bin) => {
                *bin += 1;
                true
            }
            None => false,
        }
    }

    fn advance(&mut self) {
        for bins in &mut self.bins.series {
            bins.rotate_left(1);
            if let Some(last) = bins.last_mut() {
                *last = 0;
            }
        }
    }

    fn snapshot(&self) -> &TraceBins {
        &self.bins
    }

    fn reset(&mut self) {
        self.bins.clear();
    }

    fn mode(&self) -> TraceMode {
        TraceMode::Rolling
    }
}

/// Trace contents handed to a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceFrame {
    pub mode: TraceMode,
    pub bin_width_ms: u32,
    pub window_ms: u32,
    /// Bin start times in seconds.
    pub axis_s: Vec<f64>,
    pub green: Vec<u64>,
    pub red: Vec<u64>,
    pub transfer: Vec<u64>,
}

impl TraceFrame {
    /// Counts for `series`.
    #[must_use]
    pub fn series(&self, series: TraceSeries) -> &[u64] {
        match series {
            TraceSeries::Green => &self.green,
            TraceSeries::Red => &self.red,
            TraceSeries::Transfer => &self.transfer,
        }
    }
}

/// Live trace with pending reconfiguration.
///
/// Settings changes are staged and only take effect in [`TraceAggregator::flush`],
/// so a window's bin layout never changes while it accumulates.
pub struct TraceAggregator {
    calibration: Calibration,
    layout: TraceLayout,
    pending: TraceSettings,
    strategy: Box<dyn TraceBinningStrategy>,
}

impl std::fmt::Debug for TraceAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceAggregator")
            .field("layout", &self.layout)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl TraceAggregator {
    /// Creates a trace for `settings`.
    #[must_use]
    pub fn new(calibration: Calibration, settings: TraceSettings) -> Self {
        let layout = TraceLayout::new(&calibration, settings);
        Self {
            calibration,
            layout,
            pending: TraceSettings {
                bin_width_ms: layout.bin_width_ms,
                window_ms: layout.window_ms,
            },
            strategy: build_strategy(&layout),
        }
    }

    /// Layout of the window being accumulated.
    #[must_use]
    pub fn layout(&self) -> &TraceLayout {
        &self.layout
    }

    /// Settings that take effect at the next flush.
    #[must_use]
    pub fn pending(&self) -> TraceSettings {
        self.pending
    }

    /// Overflow units after which the current window is complete.
    #[must_use]
    pub fn threshold(&self) -> u64 {
        self.layout.threshold()
    }

    /// Counts a photon; see [`TraceBinningStrategy::record`].
    #[inline]
    pub fn record(&mut self, series: TraceSeries, ofl_units: u64) -> bool {
        self.strategy.record(series, ofl_units)
    }

    /// Shifts a rolling trace by one bin. No-op when indexed.
    pub fn advance(&mut self) {
        self.strategy.advance();
    }

    /// Current bin contents.
    #[must_use]
    pub fn bins(&self) -> &TraceBins {
        self.strategy.snapshot()
    }

    /// Copies the current window into a frame.
    #[must_use]
    pub fn snapshot(&self) -> TraceFrame {
        let bins = self.strategy.snapshot();
        TraceFrame {
            mode: self.strategy.mode(),
            bin_width_ms: self.layout.bin_width_ms,
            window_ms: self.layout.window_ms,
            axis_s: self.layout.axis_s(),
            green: bins.get(TraceSeries::Green).to_vec(),
            red: bins.get(TraceSeries::Red).to_vec(),
            transfer: bins.get(TraceSeries::Transfer).to_vec(),
        }
    }

    /// Zeroes every bin.
    pub fn reset(&mut self) {
        self.strategy.reset();
    }

    /// Stages a new bin width.
    ///
    /// A width longer than the staged window is accepted; the window is raised
    /// to match when the change is applied.
    ///
    /// # Errors
    /// Returns [`ControlError::NotPositive`] for zero, or
    /// [`ControlError::TooManyBins`] if the staged window would need more than
    /// [`MAX_TRACE_BINS`] bins.
    pub fn set_bin_width_ms(&mut self, bin_width_ms: u32) -> Result<(), ControlError> {
        if bin_width_ms == 0 {
            return Err(ControlError::NotPositive {
                setting: "trace.bin",
                value: 0.0,
                restored: f64::from(self.pending.bin_width_ms),
            });
        }
        self.check_bin_count(TraceSettings {
            bin_width_ms,
            ..self.pending
        })?;
        self.pending.bin_width_ms = bin_width_ms;
        Ok(())
    }

    /// Stages a new window length.
    ///
    /// # Errors
    /// Returns [`ControlError::NotPositive`] for zero, or
    /// [`ControlError::WindowShorterThanBin`] if the window is shorter than the
    /// staged bin width, or [`ControlError::TooManyBins`] if it would need
    /// more than [`MAX_TRACE_BINS`] bins.
    pub fn set_window_ms(&mut self, window_ms: u32) -> Result<(), ControlError> {
        if window_ms == 0 {
            return Err(ControlError::NotPositive {
                setting: "trace.window",
                value: 0.0,
                restored: f64::from(self.pending.window_ms),
            });
        }
        if window_ms < self.pending.bin_width_ms {
            return Err(ControlError::WindowShorterThanBin {
                window_ms,
                bin_width_ms: self.pending.bin_width_ms,
                restored_ms: self.pending.window_ms,
            });
        }
        self.check_bin_count(TraceSettings {
            window_ms,
            ..self.pending
        })?;
        self.pending.window_ms = window_ms;
        Ok(())
    }

    fn check_bin_count(&self, candidate: TraceSettings) -> Result<(), ControlError> {
        let bin_count = candidate.bin_count();
        if bin_count > MAX_TRACE_BINS as u64 {
            return Err(ControlError::TooManyBins {
                window_ms: candidate.window_ms,
                bin_width_ms: candidate.bin_width_ms,
                bin_count,
                max_bins: MAX_TRACE_BINS,
                restored_window_ms: self.pending.window_ms,
                restored_bin_width_ms: self.pending.bin_width_ms,
            });
        }
        Ok(())
    }

    /// Ends the current window: returns its contents, applies staged
    /// settings, and zeroes the bins.
    pub fn flush(&mut self) -> TraceFrame {
        let frame = self.snapshot();
        self.apply_pending();
        self.strategy.reset();
        frame
    }

    fn apply_pending(&mut self) {
        let current = TraceSettings {
            bin_width_ms: self.layout.bin_width_ms,
            window_ms: self.layout.window_ms,
        };
        if self.pending == current {
            return;
        }
        if self.pending.bin_width_ms > self.pending.window_ms {
            log::info!(
                "trace window raised from {} ms to the {} ms bin width",
                self.pending.window_ms,
                self.pending.bin_width_ms
            );
            self.pending.window_ms = self.pending.bin_width_ms;
        }

        let layout = TraceLayout::new(&self.calibration, self.pending);
        self.strategy = build_strategy(&layout);
        log::info!(
            "trace reconfigured: {} ms bins over {} ms ({} bins, {} overflow units per bin, {:?})",
            layout.bin_width_ms,
            layout.window_ms,
            layout.bin_count,
            layout.overflow_units_per_bin,
            layout.mode
        );
        self.layout = layout;
    }
}

fn build_strategy(layout: &TraceLayout) -> Box<dyn TraceBinningStrategy> {
    match layout.mode {
        TraceMode::Indexed => Box::new(IndexedTrace::new(
            layout.bin_count,
            layout.overflow_units_per_bin,
        )),
        TraceMode::Rolling => Box::new(RollingTrace::new(layout.bin_count)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calibration() -> Calibration {
        // 4 ps resolution, 75 ns sync period
        Calibration::new(4e-12, 75e-9).unwrap()
    }

    fn settings(bin_width_ms: u32, window_ms: u32) -> TraceSettings {
        TraceSettings {
            bin_width_ms,
            window_ms,
        }
    }

    #[test]
    fn test_layout_derivation() {
        let layout = TraceLayout::new(&calibration(), settings(1, 100));
        assert_eq!(layout.bin_count, 100);
        assert_eq!(layout.overflow_units_per_bin, 13);
        assert_eq!(layout.threshold(), 1300);
        assert_eq!(layout.mode, TraceMode::Indexed);

        let layout = TraceLayout::new(&calibration(), settings(100, 1000));
        assert_eq!(layout.bin_count, 10);
        assert_eq!(layout.overflow_units_per_bin, 1302);
        assert_eq!(layout.mode, TraceMode::Rolling);

        // partial last bin rounds the count up
        assert_eq!(TraceLayout::new(&calibration(), settings(3, 10)).bin_count, 4);
    }

    #[test]
    fn test_axis_is_bin_starts() {
        let axis = TraceLayout::new(&calibration(), settings(10, 50)).axis_s();
        assert_eq!(axis.len(), 5);
        assert_relative_eq!(axis[0], 0.0);
        assert_relative_eq!(axis[4], 0.04);
    }

    #[test]
    fn test_indexed_record_and_drop() {
        let mut trace = IndexedTrace::new(4, 13);
        assert!(trace.record(TraceSeries::Green, 0));
        assert!(trace.record(TraceSeries::Green, 12));
        assert!(trace.record(TraceSeries::Green, 13));
        assert!(trace.record(TraceSeries::Red, 51));

        let before = trace.snapshot().clone();
        assert!(!trace.record(TraceSeries::Red, 52));
        assert_eq!(trace.snapshot(), &before);

        assert_eq!(trace.snapshot().get(TraceSeries::Green), &[2, 1, 0, 0]);
        assert_eq!(trace.snapshot().get(TraceSeries::Red), &[0, 0, 0, 1]);
    }

    #[test]
    fn test_rolling_shifts_on_advance() {
        let mut trace = RollingTrace::new(3);
        trace.record(TraceSeries::Green, 0);
        trace.advance();
        trace.record(TraceSeries::Green, 0);
        trace.record(TraceSeries::Green, 0);
        trace.advance();
        trace.record(TraceSeries::Green, 0);
        trace.record(TraceSeries::Green, 0);
        trace.record(TraceSeries::Green, 0);
        assert_eq!(trace.snapshot().get(TraceSeries::Green), &[1, 2, 3]);

        trace.advance();
        assert_eq!(trace.snapshot().get(TraceSeries::Green), &[2, 3, 0]);
    }

    #[test]
    fn test_pending_applies_only_on_flush() {
        let mut trace = TraceAggregator::new(calibration(), settings(1, 100));
        trace.set_bin_width_ms(10).unwrap();
        assert_eq!(trace.layout().bin_count, 100);
        trace.record(TraceSeries::Green, 0);

        let frame = trace.flush();
        assert_eq!(frame.green.len(), 100);
        assert_eq!(frame.green[0], 1);
        assert_eq!(trace.layout().bin_count, 10);
        assert_eq!(trace.layout().overflow_units_per_bin, 130);
        assert_eq!(trace.bins().total(), 0);
    }

    #[test]
    fn test_window_forced_up_to_bin() {
        let mut trace = TraceAggregator::new(calibration(), settings(1, 100));
        trace.set_bin_width_ms(500).unwrap();
        trace.flush();
        assert_eq!(trace.layout().window_ms, 500);
        assert_eq!(trace.layout().bin_count, 1);
        assert_eq!(trace.layout().mode, TraceMode::Rolling);
    }

    #[test]
    fn test_window_shorter_than_bin_rejected() {
        let mut trace = TraceAggregator::new(calibration(), settings(10, 100));
        assert_eq!(
            trace.set_window_ms(5),
            Err(ControlError::WindowShorterThanBin {
                window_ms: 5,
                bin_width_ms: 10,
                restored_ms: 100
            })
        );
        assert!(matches!(
            trace.set_bin_width_ms(0),
            Err(ControlError::NotPositive { restored, .. }) if restored == 10.0
        ));
        assert_eq!(trace.pending(), settings(10, 100));
    }

    #[test]
    fn test_oversized_window_rejected() {
        let mut trace = TraceAggregator::new(calibration(), settings(1, 100));
        assert_eq!(
            trace.set_window_ms(4_000_000_000),
            Err(ControlError::TooManyBins {
                window_ms: 4_000_000_000,
                bin_width_ms: 1,
                bin_count: 4_000_000_000,
                max_bins: MAX_TRACE_BINS,
                restored_window_ms: 100,
                restored_bin_width_ms: 1,
            })
        );

        // shrinking the bin under a long window hits the same bound
        trace.set_bin_width_ms(10).unwrap();
        trace.set_window_ms(10 * 100_000).unwrap();
        assert!(matches!(
            trace.set_bin_width_ms(1),
            Err(ControlError::TooManyBins { restored_bin_width_ms: 10, .. })
        ));
        assert_eq!(trace.pending(), settings(10, 1_000_000));

        trace.flush();
        assert_eq!(trace.layout().bin_count, MAX_TRACE_BINS);
    }

    #[test]
    fn test_switch_to_rolling_and_back() {
        let mut trace = TraceAggregator::new(calibration(), settings(1, 100));
        trace.set_bin_width_ms(100).unwrap();
        trace.set_window_ms(1000).unwrap();
        trace.flush();
        assert_eq!(trace.layout().mode, TraceMode::Rolling);

        trace.set_bin_width_ms(1).unwrap();
        trace.set_window_ms(100).unwrap();
        trace.flush();
        assert_eq!(trace.layout().mode, TraceMode::Indexed);
        assert_eq!(trace.threshold(), 1300);
    }
}
