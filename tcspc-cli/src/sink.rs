//! Frame output: one text line or one JSON object per frame.

use serde::Serialize;
use std::io::{self, Write};
use tcspc_aggregate::{FrameSink, TraceFrame, WindowFrame};
use tcspc_io::BufferAlert;

/// Tagged JSON line.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Line<'a> {
    Window(&'a WindowFrame),
    TraceAdvance(&'a TraceFrame),
    BufferAlert { pile_up: bool, occupancy: usize },
}

/// Writes frames to `out`.
///
/// Write errors are held until [`PrintSink::check`] so the session never sees them.
pub struct PrintSink<W: Write> {
    out: W,
    json: bool,
    advances: bool,
    error: Option<io::Error>,
}

impl<W: Write> PrintSink<W> {
    pub fn new(out: W, json: bool, advances: bool) -> Self {
        Self {
            out,
            json,
            advances,
            error: None,
        }
    }

    /// Returns the first write error since the last check.
    pub fn check(&mut self) -> io::Result<()> {
        match self.error.take() {
            Some(e) => Err(e),
            None => self.out.flush(),
        }
    }

    /// Writes a value as a JSON line regardless of the output mode.
    pub fn write_json<T: Serialize>(&mut self, value: &T) {
        let result = serde_json::to_writer(&mut self.out, value)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(self.out));
        self.record(result);
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn record(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }

    fn write_window_text(&mut self, frame: &WindowFrame) -> io::Result<()> {
        let trace = &frame.trace;
        let sum = |v: &[u64]| v.iter().sum::<u64>();
        write!(
            self.out,
            "window {:>5} | {} x {} ms |",
            frame.window_index,
            trace.green.len(),
            trace.bin_width_ms
        )?;
        if frame.visibility.green {
            write!(self.out, " green {:>8}", sum(&trace.green))?;
        }
        if frame.visibility.red {
            write!(self.out, " red {:>8}", sum(&trace.red))?;
        }
        if frame.visibility.transfer && frame.fret.enabled {
            write!(self.out, " transfer {:>8}", sum(&trace.transfer))?;
        }
        let hist = &frame.histogram;
        write!(
            self.out,
            " | hist {:.1} ps: green {} red {}",
            hist.bin_width_ps,
            sum(&hist.green),
            sum(&hist.red)
        )?;
        if let Some(peak) = peak_ns(&hist.axis_ns, &hist.green) {
            write!(self.out, " (green peak {peak:.2} ns)")?;
        }
        let dropped = frame.drops.total();
        if dropped > 0 {
            write!(self.out, " | dropped {dropped}")?;
        }
        writeln!(self.out)
    }
}

/// Bin centre of the largest count, if any bin is non-zero.
fn peak_ns(axis_ns: &[f64], counts: &[u64]) -> Option<f64> {
    counts
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c > 0)
        .max_by_key(|&(_, &c)| c)
        .and_then(|(i, _)| axis_ns.get(i).copied())
}

impl<W: Write> FrameSink for PrintSink<W> {
    fn window_completed(&mut self, frame: &WindowFrame) {
        if self.json {
            self.write_json(&Line::Window(frame));
        } else {
            let result = self.write_window_text(frame);
            self.record(result);
        }
    }

    fn trace_advanced(&mut self, trace: &TraceFrame) {
        if self.json {
            self.write_json(&Line::TraceAdvance(trace));
        } else {
            let latest = |v: &[u64]| v.last().copied().unwrap_or(0);
            let result = writeln!(
                self.out,
                "  advance | green {} red {} transfer {}",
                latest(&trace.green),
                latest(&trace.red),
                latest(&trace.transfer)
            );
            self.record(result);
        }
    }

    fn wants_trace_advances(&self) -> bool {
        self.advances
    }

    fn buffer_alert(&mut self, alert: BufferAlert) {
        // the text form is already logged by the buffer
        if self.json {
            let line = match alert {
                BufferAlert::PileUp { occupancy } => Line::BufferAlert {
                    pile_up: true,
                    occupancy,
                },
                BufferAlert::Cleared { occupancy } => Line::BufferAlert {
                    pile_up: false,
                    occupancy,
                },
            };
            self.write_json(&line);
        }
    }
}
