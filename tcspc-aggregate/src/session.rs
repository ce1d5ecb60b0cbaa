//! Acquisition session: overflow accumulator, aggregators and the window state machine.
//!
//! Records are consumed one at a time. Photons are counted into the trace and
//! histogram at the current overflow count; overflow records advance the
//! count and, once it reaches the window threshold, end the window:
//!
//! ```text
//! Accumulating --ofl >= threshold--> ThresholdReached --> Flushing --> Accumulating
//! ```
//!
//! Flushing hands a [`WindowFrame`] to the [`FrameSink`], applies staged trace
//! and histogram settings, zeroes the trace and resets the count.

use crate::config::{SessionConfig, Visibility};
use crate::control::ControlCommand;
use crate::error::ControlError;
use crate::fret::FretClassifier;
use crate::histogram::{HistogramAggregator, HistogramFrame};
use crate::stats::{DropCounters, RecordCounters};
use crate::trace::{TraceAggregator, TraceFrame, TraceMode};
use crate::Result;
use serde::Serialize;
use tcspc_core::{Calibration, ChannelMap};
use tcspc_io::{BufferAlert, StreamBuffer};
use tcspc_ptu::{T3Event, T3Record};

/// Phase of the window flush state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// Counting photons into the current window.
    Accumulating,
    /// The overflow count reached the threshold; the window is complete.
    ThresholdReached,
    /// Handing the window to the sink and applying staged settings.
    Flushing,
}

/// Everything a display needs for one completed window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowFrame {
    /// Zero-based index of the window within the run.
    pub window_index: u64,
    pub trace: TraceFrame,
    /// Cumulative since the last re-bin or reset.
    pub histogram: HistogramFrame,
    pub visibility: Visibility,
    pub fret: crate::config::FretSettings,
    pub drops: DropCounters,
    pub records: RecordCounters,
}

/// Receives frames from a session.
pub trait FrameSink {
    /// Called once per completed window.
    fn window_completed(&mut self, frame: &WindowFrame);

    /// Called when a rolling trace shifts by one bin inside a window.
    fn trace_advanced(&mut self, _trace: &TraceFrame) {}

    /// Whether [`FrameSink::trace_advanced`] should be called at all.
    ///
    /// Returning `false` skips building a frame at every rolling bin boundary.
    fn wants_trace_advances(&self) -> bool {
        true
    }

    /// Called when the stream buffer enters or leaves the pile-up state.
    fn buffer_alert(&mut self, _alert: BufferAlert) {}
}

/// Collects frames in memory.
#[derive(Debug, Default)]
pub struct FrameCollector {
    pub windows: Vec<WindowFrame>,
    pub advances: Vec<TraceFrame>,
    pub alerts: Vec<BufferAlert>,
}

impl FrameSink for FrameCollector {
    fn window_completed(&mut self, frame: &WindowFrame) {
        self.windows.push(frame.clone());
    }

    fn trace_advanced(&mut self, trace: &TraceFrame) {
        self.advances.push(trace.clone());
    }

    fn buffer_alert(&mut self, alert: BufferAlert) {
        self.alerts.push(alert);
    }
}

/// What one record did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Counted, ignored, or an overflow that left the window open.
    Consumed,
    /// An overflow completed the window; it is flushed on the next call.
    ThresholdReached,
}

/// Result of one consumer step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Records taken from the buffer.
    pub records: u64,
    /// Whether a window was flushed.
    pub flushed: bool,
}

/// Live aggregation state for one open stream.
#[derive(Debug)]
pub struct Session {
    calibration: Calibration,
    channels: ChannelMap,
    ofl: u64,
    state: WindowState,
    window_index: u64,
    trace: TraceAggregator,
    histogram: HistogramAggregator,
    fret: FretClassifier,
    visibility: Visibility,
    drops: DropCounters,
    records: RecordCounters,
}

impl Session {
    /// Creates a session at stream open.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(calibration: Calibration, config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let trace = TraceAggregator::new(calibration, config.trace);
        let histogram = HistogramAggregator::new(&calibration, config.histogram.bin_width_ps)?;
        log::info!(
            "session: {:.1} ps resolution, {:.3} MHz sync, {} overflow units per {} ms trace bin, {} histogram bins of {:.1} ps",
            calibration.measurement_resolution_ps(),
            calibration.sync_rate_hz() * 1e-6,
            trace.layout().overflow_units_per_bin,
            trace.layout().bin_width_ms,
            histogram.layout().bin_count,
            histogram.layout().bin_width_ps
        );
        Ok(Self {
            calibration,
            channels: config.channels,
            ofl: 0,
            state: WindowState::Accumulating,
            window_index: 0,
            trace,
            histogram,
            fret: FretClassifier::new(&config.fret),
            visibility: config.visibility,
            drops: DropCounters::default(),
            records: RecordCounters::default(),
        })
    }

    /// Calibration the session was created with.
    #[must_use]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Overflow units elapsed in the current window.
    #[must_use]
    pub fn ofl(&self) -> u64 {
        self.ofl
    }

    /// Current phase of the window state machine.
    #[must_use]
    pub fn window_state(&self) -> WindowState {
        self.state
    }

    /// Number of windows flushed so far.
    #[must_use]
    pub fn window_index(&self) -> u64 {
        self.window_index
    }

    #[must_use]
    pub fn trace(&self) -> &TraceAggregator {
        &self.trace
    }

    #[must_use]
    pub fn histogram(&self) -> &HistogramAggregator {
        &self.histogram
    }

    #[must_use]
    pub fn fret(&self) -> &FretClassifier {
        &self.fret
    }

    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    #[must_use]
    pub fn drops(&self) -> DropCounters {
        self.drops
    }

    #[must_use]
    pub fn records(&self) -> RecordCounters {
        self.records
    }

    /// Consumes one record.
    ///
    /// A window completed by the previous record is flushed first.
    pub fn process_record(&mut self, record: T3Record, sink: &mut dyn FrameSink) -> RecordOutcome {
        if self.state == WindowState::ThresholdReached {
            self.flush(sink);
        }
        self.records.records += 1;

        match record.decode() {
            T3Event::Overflow { units } => self.on_overflow(u64::from(units), sink),
            T3Event::Photon {
                channel,
                micro_time,
                ..
            } => {
                self.on_photon(channel, micro_time);
                RecordOutcome::Consumed
            }
            T3Event::Marker { .. } => {
                self.records.markers += 1;
                RecordOutcome::Consumed
            }
        }
    }

    /// Drains `buffer` until one window is flushed or the buffer is empty.
    pub fn step(&mut self, buffer: &mut StreamBuffer, sink: &mut dyn FrameSink) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        if self.state == WindowState::ThresholdReached {
            self.flush(sink);
            outcome.flushed = true;
            return outcome;
        }

        while let Some((record, alert)) = buffer.pop() {
            if let Some(alert) = alert {
                sink.buffer_alert(alert);
            }
            outcome.records += 1;
            if self.process_record(record, sink) == RecordOutcome::ThresholdReached {
                self.flush(sink);
                outcome.flushed = true;
                break;
            }
        }
        outcome
    }

    /// Consumes every buffered record at end of stream. Returns the number of records.
    ///
    /// The last, partial window is left unflushed; use [`Session::snapshot`] to read it.
    pub fn drain(&mut self, buffer: &mut StreamBuffer, sink: &mut dyn FrameSink) -> u64 {
        let mut records = 0;
        loop {
            let outcome = self.step(buffer, sink);
            records += outcome.records;
            if !outcome.flushed && buffer.is_empty() {
                break;
            }
        }
        let dangling = buffer.finish();
        if dangling > 0 {
            log::debug!("discarded {dangling} trailing bytes at end of stream");
        }
        records
    }

    /// Frame of the window in progress, without flushing it.
    #[must_use]
    pub fn snapshot(&self) -> WindowFrame {
        self.frame(self.trace.snapshot())
    }

    /// Applies an operator command between records.
    ///
    /// Layout changes are staged until the next flush; FRET, visibility and
    /// histogram reset take effect immediately.
    ///
    /// # Errors
    /// Returns a [`ControlError`] carrying the value still in force. Nothing
    /// changes when an error is returned.
    pub fn apply(&mut self, command: ControlCommand) -> std::result::Result<(), ControlError> {
        match command {
            ControlCommand::TraceBinWidth(ms) => self.trace.set_bin_width_ms(ms)?,
            ControlCommand::TraceWindow(ms) => self.trace.set_window_ms(ms)?,
            ControlCommand::HistogramBinWidth(ps) => {
                let applied = self.histogram.reconfigure(ps)?;
                log::info!("histogram bin width {applied:.1} ps staged for the next window");
            }
            ControlCommand::HistogramReset => self.histogram.reset(),
            ControlCommand::FretLow(ns) => {
                self.fret.set_low_ns(ns)?;
            }
            ControlCommand::FretHigh(ns) => {
                self.fret.set_high_ns(ns)?;
            }
            ControlCommand::Fret(enabled) => self.fret.set_enabled(enabled),
            ControlCommand::Show(series, visible) => self.visibility.set(series, visible),
        }
        log::info!("applied: {command}");
        Ok(())
    }

    fn on_photon(&mut self, channel: u8, micro_time: u16) {
        self.records.photons += 1;
        let Some(detector) = self.channels.detector(channel) else {
            self.drops.ignored_photons += 1;
            return;
        };

        let series = self
            .fret
            .classify(detector, self.calibration.micro_time_ns(micro_time));
        if !self.trace.record(series, self.ofl) {
            self.drops.trace_out_of_range += 1;
        }
        if !self.histogram.record(detector, micro_time) {
            self.drops.histogram_out_of_range += 1;
        }
    }

    fn on_overflow(&mut self, units: u64, sink: &mut dyn FrameSink) -> RecordOutcome {
        self.records.overflows += 1;
        self.records.overflow_units += units;

        let before = self.ofl;
        self.ofl += units;

        let layout = *self.trace.layout();
        if layout.mode == TraceMode::Rolling {
            // one shift per bin boundary k * upb crossed, 0 < k < bin_count
            let upb = layout.overflow_units_per_bin;
            let last_boundary = layout.bin_count.saturating_sub(1) as u64;
            let first = before / upb + 1;
            let last = (self.ofl / upb).min(last_boundary);
            let notify = sink.wants_trace_advances();
            for _ in first..=last {
                self.trace.advance();
                if notify {
                    sink.trace_advanced(&self.trace.snapshot());
                }
            }
        }

        if self.ofl >= self.trace.threshold() {
            self.state = WindowState::ThresholdReached;
            RecordOutcome::ThresholdReached
        } else {
            RecordOutcome::Consumed
        }
    }

    fn flush(&mut self, sink: &mut dyn FrameSink) {
        self.state = WindowState::Flushing;

        let trace = self.trace.flush();
        let frame = self.frame(trace);
        sink.window_completed(&frame);

        self.histogram.apply_pending();
        self.ofl = 0;
        self.window_index += 1;
        self.state = WindowState::Accumulating;
    }

    fn frame(&self, trace: TraceFrame) -> WindowFrame {
        WindowFrame {
            window_index: self.window_index,
            trace,
            histogram: self.histogram.snapshot(),
            visibility: self.visibility,
            fret: self.fret.settings(),
            drops: self.drops,
            records: self.records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let calibration = Calibration::new(4e-12, 75e-9).unwrap();
        Session::new(calibration, &SessionConfig::default()).unwrap()
    }

    #[test]
    fn test_overflow_units() {
        let mut session = session();
        let mut sink = FrameCollector::default();
        session.process_record(T3Record::overflow(0), &mut sink);
        assert_eq!(session.ofl(), 1);
        session.process_record(T3Record::overflow(7), &mut sink);
        assert_eq!(session.ofl(), 8);
    }

    #[test]
    fn test_threshold_state_is_observable() {
        let mut session = session();
        let mut sink = FrameCollector::default();
        assert_eq!(session.window_state(), WindowState::Accumulating);

        // 1 ms bins over 100 ms: 13 * 100 units
        for _ in 0..(1300 / 100) {
            session.process_record(T3Record::overflow(100), &mut sink);
        }
        assert_eq!(session.window_state(), WindowState::ThresholdReached);
        assert!(sink.windows.is_empty());

        // the next record flushes the completed window before it is counted
        session.process_record(T3Record::photon(2, 100, 0), &mut sink);
        assert_eq!(session.window_state(), WindowState::Accumulating);
        assert_eq!(sink.windows.len(), 1);
        assert_eq!(session.ofl(), 0);
        assert_eq!(session.trace().bins().get(tcspc_core::TraceSeries::Green)[0], 1);
    }

    #[test]
    fn test_markers_are_ignored() {
        let mut session = session();
        let mut sink = FrameCollector::default();
        session.process_record(T3Record((1 << 31) | (2 << 25)), &mut sink);
        assert_eq!(session.records().markers, 1);
        assert_eq!(session.ofl(), 0);
        assert_eq!(session.trace().bins().total(), 0);
    }

    #[test]
    fn test_rejected_command_changes_nothing() {
        let mut session = session();
        let err = session.apply(ControlCommand::TraceWindow(0)).unwrap_err();
        assert!(matches!(err, ControlError::NotPositive { restored, .. } if restored == 100.0));
        assert_eq!(session.trace().pending().window_ms, 100);
    }

    #[test]
    fn test_oversized_window_keeps_session_running() {
        let mut session = session();
        let mut sink = FrameCollector::default();
        session.process_record(T3Record::photon(2, 3750, 0), &mut sink);

        let err = session
            .apply(ControlCommand::TraceWindow(4_000_000_000))
            .unwrap_err();
        assert!(matches!(
            err,
            ControlError::TooManyBins {
                restored_window_ms: 100,
                ..
            }
        ));

        // complete and flush the window with the old layout
        session.process_record(T3Record::overflow(650), &mut sink);
        session.process_record(T3Record::overflow(650), &mut sink);
        session.process_record(T3Record::photon(2, 3750, 0), &mut sink);
        assert_eq!(sink.windows.len(), 1);
        assert_eq!(session.trace().layout().bin_count, 100);
        let donor = session.histogram().counts(tcspc_core::Detector::Donor);
        assert_eq!(donor.iter().sum::<u64>(), 2);
    }

    #[test]
    fn test_rolling_advances_without_notifying() {
        struct WindowsOnly(usize);

        impl FrameSink for WindowsOnly {
            fn window_completed(&mut self, _frame: &WindowFrame) {
                self.0 += 1;
            }

            fn trace_advanced(&mut self, _trace: &TraceFrame) {
                panic!("advance delivered to a sink that declined them");
            }

            fn wants_trace_advances(&self) -> bool {
                false
            }
        }

        let calibration = Calibration::new(4e-12, 75e-9).unwrap();
        let mut config = SessionConfig::default();
        config.trace.bin_width_ms = 100;
        config.trace.window_ms = 300;
        let mut session = Session::new(calibration, &config).unwrap();
        let mut sink = WindowsOnly(0);

        // 1302 units per 100 ms bin: one boundary crossed, the ring still shifts
        session.process_record(T3Record::photon(2, 100, 0), &mut sink);
        session.process_record(T3Record::overflow(1400), &mut sink);
        let green = session.trace().bins().get(tcspc_core::TraceSeries::Green).to_vec();
        assert_eq!(green, vec![0, 1, 0]);
        assert_eq!(sink.0, 0);
    }
}
