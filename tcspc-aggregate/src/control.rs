//! Operator commands, parsed from text.
//!
//! ```text
//! trace.bin <ms>        trace.window <ms>
//! hist.bin <ps>         hist.reset
//! fret.low <ns>         fret.high <ns>
//! fret.on               fret.off
//! show <green|red|transfer> <on|off>
//! ```

use crate::error::ControlError;
use std::fmt;
use std::str::FromStr;
use tcspc_core::TraceSeries;

/// A reconfiguration request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    /// Trace bin width in milliseconds, applied at the next flush.
    TraceBinWidth(u32),
    /// Trace window in milliseconds, applied at the next flush.
    TraceWindow(u32),
    /// Histogram bin width in picoseconds, applied at the next flush.
    HistogramBinWidth(f64),
    /// Clear the histogram now.
    HistogramReset,
    /// Lower FRET edge in nanoseconds.
    FretLow(f64),
    /// Upper FRET edge in nanoseconds.
    FretHigh(f64),
    /// Enable or disable the transfer series.
    Fret(bool),
    /// Show or hide a series.
    Show(TraceSeries, bool),
}

impl FromStr for ControlCommand {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let Some(command) = words.next() else {
            return Err(ControlError::UnknownCommand(String::new()));
        };
        let args: Vec<&str> = words.collect();
        let command_lower = command.to_ascii_lowercase();

        let parsed = match command_lower.as_str() {
            "trace.bin" => ControlCommand::TraceBinWidth(parse_ms(command, &args)?),
            "trace.window" => ControlCommand::TraceWindow(parse_ms(command, &args)?),
            "hist.bin" => ControlCommand::HistogramBinWidth(parse_positive(command, &args)?),
            "hist.reset" => {
                expect_args(command, &args, 0)?;
                ControlCommand::HistogramReset
            }
            "fret.low" => ControlCommand::FretLow(parse_number(command, &args)?),
            "fret.high" => ControlCommand::FretHigh(parse_number(command, &args)?),
            "fret.on" => {
                expect_args(command, &args, 0)?;
                ControlCommand::Fret(true)
            }
            "fret.off" => {
                expect_args(command, &args, 0)?;
                ControlCommand::Fret(false)
            }
            "show" => {
                expect_args(command, &args, 2)?;
                let series = TraceSeries::from_name(args[0]).ok_or_else(|| {
                    invalid(command, format!("unknown series '{}'", args[0]))
                })?;
                ControlCommand::Show(series, parse_switch(command, args[1])?)
            }
            _ => return Err(ControlError::UnknownCommand(command.to_string())),
        };
        Ok(parsed)
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::TraceBinWidth(ms) => write!(f, "trace.bin {ms}"),
            ControlCommand::TraceWindow(ms) => write!(f, "trace.window {ms}"),
            ControlCommand::HistogramBinWidth(ps) => write!(f, "hist.bin {ps}"),
            ControlCommand::HistogramReset => write!(f, "hist.reset"),
            ControlCommand::FretLow(ns) => write!(f, "fret.low {ns}"),
            ControlCommand::FretHigh(ns) => write!(f, "fret.high {ns}"),
            ControlCommand::Fret(true) => write!(f, "fret.on"),
            ControlCommand::Fret(false) => write!(f, "fret.off"),
            ControlCommand::Show(series, visible) => {
                let name = match series {
                    TraceSeries::Green => "green",
                    TraceSeries::Red => "red",
                    TraceSeries::Transfer => "transfer",
                };
                write!(f, "show {name} {}", if *visible { "on" } else { "off" })
            }
        }
    }
}

fn invalid(command: &str, reason: String) -> ControlError {
    ControlError::InvalidArgument {
        command: command.to_string(),
        reason,
    }
}

fn expect_args(command: &str, args: &[&str], count: usize) -> Result<(), ControlError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(invalid(
            command,
            format!("expected {count} argument(s), got {}", args.len()),
        ))
    }
}

fn parse_number(command: &str, args: &[&str]) -> Result<f64, ControlError> {
    expect_args(command, args, 1)?;
    let value: f64 = args[0]
        .parse()
        .map_err(|_| invalid(command, format!("'{}' is not a number", args[0])))?;
    if value.is_nan() {
        return Err(invalid(command, "NaN is not allowed".to_string()));
    }
    Ok(value)
}

fn parse_positive(command: &str, args: &[&str]) -> Result<f64, ControlError> {
    let value = parse_number(command, args)?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(invalid(command, format!("{value} is not positive")))
    }
}

/// Whole milliseconds. Fractions are rejected rather than rounded.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_ms(command: &str, args: &[&str]) -> Result<u32, ControlError> {
    let value = parse_positive(command, args)?;
    if value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(invalid(
            command,
            format!("{value} is not a whole number of milliseconds"),
        ));
    }
    Ok(value as u32)
}

fn parse_switch(command: &str, word: &str) -> Result<bool, ControlError> {
    match word.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(invalid(command, format!("expected on or off, got '{word}'"))),
    }
}
