//! Command-line configuration: JSON file plus flag overrides.

use clap::Args;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tcspc_aggregate::SessionConfig;
use tcspc_io::{StartPosition, StreamConfig};

use crate::{CliError, Result};

/// Combined configuration file layout.
///
/// ```json
/// {
///   "session": { "trace": { "bin_width_ms": 10 }, "fret": { "enabled": true } },
///   "stream": { "buffer_capacity": 500000, "start": "beginning" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub session: SessionConfig,
    pub stream: StreamConfig,
}

/// Flags shared by `tail` and `replay`. Each one overrides the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print one JSON object per frame instead of a text summary
    #[arg(long)]
    pub json: bool,

    /// Also print intermediate frames from a rolling trace
    #[arg(long)]
    pub advances: bool,

    /// Do not read control commands from stdin
    #[arg(long)]
    pub no_control: bool,

    /// Trace bin width (ms)
    #[arg(long)]
    pub trace_bin_ms: Option<u32>,

    /// Trace window length (ms)
    #[arg(long)]
    pub trace_window_ms: Option<u32>,

    /// Histogram bin width (ps), quantized to the measurement resolution
    #[arg(long)]
    pub hist_bin_ps: Option<f64>,

    /// Lower edge of the FRET acceptance window (ns)
    #[arg(long)]
    pub fret_low_ns: Option<f64>,

    /// Upper edge of the FRET acceptance window (ns)
    #[arg(long)]
    pub fret_high_ns: Option<f64>,

    /// Route in-window acceptor photons to the transfer trace
    #[arg(long)]
    pub fret: bool,

    /// Donor (green) channel number
    #[arg(long)]
    pub donor_channel: Option<u8>,

    /// Acceptor (red) channel number
    #[arg(long)]
    pub acceptor_channel: Option<u8>,

    /// Buffer occupancy (records) that triggers a pile-up warning
    #[arg(long)]
    pub buffer_capacity: Option<usize>,

    /// Maximum bytes read per poll or replay chunk
    #[arg(long)]
    pub read_chunk_bytes: Option<usize>,
}

impl CliConfig {
    /// Reads `path` if given, otherwise starts from defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let file = File::open(path)?;
                let config: Self = serde_json::from_reader(BufReader::new(file))?;
                log::debug!("loaded configuration from {}", path.display());
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Applies command-line overrides.
    pub fn apply(&mut self, args: &RunArgs) {
        let session = &mut self.session;
        if let Some(ms) = args.trace_bin_ms {
            session.trace.bin_width_ms = ms;
        }
        if let Some(ms) = args.trace_window_ms {
            session.trace.window_ms = ms;
        }
        if let Some(ps) = args.hist_bin_ps {
            session.histogram.bin_width_ps = ps;
        }
        if let Some(ns) = args.fret_low_ns {
            session.fret.low_ns = ns;
        }
        if let Some(ns) = args.fret_high_ns {
            session.fret.high_ns = ns;
        }
        if args.fret {
            session.fret.enabled = true;
        }
        if let Some(channel) = args.donor_channel {
            session.channels.donor = channel;
        }
        if let Some(channel) = args.acceptor_channel {
            session.channels.acceptor = channel;
        }
        let mut stream = std::mem::take(&mut self.stream);
        if let Some(records) = args.buffer_capacity {
            stream = stream.with_buffer_capacity(records);
        }
        if let Some(bytes) = args.read_chunk_bytes {
            stream = stream.with_read_chunk_bytes(bytes);
        }
        self.stream = stream;
    }

    /// Loads, overrides and validates.
    ///
    /// # Errors
    /// Returns an error if loading fails or a value is out of range.
    pub fn resolve(args: &RunArgs) -> Result<Self> {
        let mut config = Self::load(args.config.as_deref())?;
        config.apply(args);
        config.session.validate()?;
        config.stream.validate()?;
        Ok(config)
    }

    /// Sets the tail start position, idle timeout and poll interval from `tail` flags.
    pub fn apply_tail(
        &mut self,
        from_start: bool,
        idle_timeout_s: Option<f64>,
        poll_interval_ms: Option<u64>,
    ) {
        let mut stream = std::mem::take(&mut self.stream);
        if from_start {
            stream = stream.with_start(StartPosition::Beginning);
        }
        if let Some(seconds) = idle_timeout_s {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let ms = (seconds.max(0.0) * 1000.0).round() as u64;
            stream = stream.with_idle_timeout_ms(ms);
        }
        if let Some(ms) = poll_interval_ms {
            stream = stream.with_poll_interval_ms(ms);
        }
        self.stream = stream;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = CliConfig::load(None).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_file_then_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "session": {{ "trace": {{ "bin_width_ms": 10, "window_ms": 500 }} }},
                "stream": {{ "buffer_capacity": 1000, "start": "beginning" }}
            }}"#
        )
        .unwrap();
        file.flush().unwrap();

        let args = RunArgs {
            config: Some(file.path().to_path_buf()),
            trace_window_ms: Some(1000),
            fret: true,
            ..RunArgs::default()
        };
        let config = CliConfig::resolve(&args).unwrap();
        assert_eq!(config.session.trace.bin_width_ms, 10);
        assert_eq!(config.session.trace.window_ms, 1000);
        assert!(config.session.fret.enabled);
        assert_eq!(config.stream.buffer_capacity, 1000);
        assert_eq!(config.stream.start, StartPosition::Beginning);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = RunArgs {
            trace_bin_ms: Some(0),
            ..RunArgs::default()
        };
        assert!(CliConfig::resolve(&args).is_err());

        let args = RunArgs {
            buffer_capacity: Some(0),
            ..RunArgs::default()
        };
        assert!(matches!(
            CliConfig::resolve(&args),
            Err(CliError::Stream(_))
        ));
    }

    #[test]
    fn test_tail_flags() {
        let mut config = CliConfig::default();
        config.apply_tail(true, Some(2.5), None);
        assert_eq!(config.stream.start, StartPosition::Beginning);
        assert_eq!(config.stream.idle_timeout_ms, Some(2500));
        assert_eq!(config.stream.poll_interval_ms, 10);

        config.apply_tail(false, None, Some(50));
        assert_eq!(config.stream.start, StartPosition::Beginning);
        assert_eq!(config.stream.idle_timeout_ms, Some(2500));
        assert_eq!(config.stream.poll_interval_ms, 50);
    }
}
