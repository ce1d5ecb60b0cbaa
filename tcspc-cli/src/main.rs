//! tcspc-live: Live trace and micro-time histogram monitor for PicoQuant PTU files.
//!
//! Follows a PTU file while the acquisition software writes it (`tail`), or
//! replays a finished file at full speed (`replay`). Control commands such as
//! `trace.bin 10` or `fret.on` are read from stdin, one per line.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

mod config;
mod sink;

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use config::{CliConfig, RunArgs};
use sink::PrintSink;
use tcspc_aggregate::{ControlCommand, DropCounters, FrameSink, RecordCounters, Session};
use tcspc_io::{BufferStats, FileTail, PtuFileReader, StreamBuffer};
use tcspc_ptu::PtuHeader;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream error: {0}")]
    Stream(#[from] tcspc_io::Error),

    #[error("PTU error: {0}")]
    Ptu(#[from] tcspc_ptu::Error),

    #[error("{0}")]
    Aggregate(#[from] tcspc_aggregate::Error),

    #[error("Configuration error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Live TCSPC trace and histogram monitor.
#[derive(Parser)]
#[command(name = "tcspc-live")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow a PTU file that is still being written
    Tail {
        /// Input PTU file
        input: PathBuf,

        /// Replay records already in the file before following new ones
        #[arg(long)]
        from_start: bool,

        /// Stop after this many seconds without new data
        #[arg(long)]
        idle_timeout_s: Option<f64>,

        /// Sleep between polls that found no data (ms)
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Replay a completed PTU file as fast as possible
    Replay {
        /// Input PTU file
        input: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Show the header of a PTU file
    Info {
        /// Input PTU file
        input: PathBuf,

        /// List every header tag
        #[arg(short, long)]
        tags: bool,
    },
}

/// End-of-run totals.
#[derive(Serialize)]
struct Summary {
    windows: u64,
    records: RecordCounters,
    drops: DropCounters,
    buffer_pile_ups: u64,
    buffer_peak_occupancy: usize,
    trailing_bytes: usize,
    elapsed_measurement_s: f64,
    wall_time_s: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Tail {
            input,
            from_start,
            idle_timeout_s,
            poll_interval_ms,
            run,
        } => {
            let mut config = CliConfig::resolve(&run)?;
            config.apply_tail(from_start, idle_timeout_s, poll_interval_ms);
            run_tail(&input, &config, &run)
        }
        Commands::Replay { input, run } => {
            let config = CliConfig::resolve(&run)?;
            run_replay(&input, &config, &run)
        }
        Commands::Info { input, tags } => show_info(&input, tags),
    }
}

fn run_tail(input: &Path, config: &CliConfig, run: &RunArgs) -> Result<()> {
    let stream = &config.stream;
    let mut tail = FileTail::open(input, stream.start, stream.read_chunk_bytes)?;
    let mut session = Session::new(tail.header().calibration()?, &config.session)?;
    let mut buffer = StreamBuffer::new(stream.buffer_capacity);
    let mut sink = PrintSink::new(io::stdout().lock(), run.json, run.advances);
    let commands = spawn_control_reader(!run.no_control);

    let poll_interval = Duration::from_millis(stream.poll_interval_ms);
    let idle_timeout = stream.idle_timeout_ms.map(Duration::from_millis);
    let started = Instant::now();
    let mut last_data = Instant::now();

    eprintln!("Following: {}", tail.path().display());
    loop {
        apply_commands(commands.as_ref(), &mut session);

        let poll = tail.poll(&mut buffer)?;
        if let Some(alert) = poll.alert {
            sink.buffer_alert(alert);
        }
        if poll.is_idle() {
            if buffer.is_empty() {
                if idle_timeout.is_some_and(|timeout| last_data.elapsed() >= timeout) {
                    log::info!("no new data for {:.1} s, stopping", last_data.elapsed().as_secs_f64());
                    break;
                }
                thread::sleep(poll_interval);
            }
        } else {
            last_data = Instant::now();
        }

        session.step(&mut buffer, &mut sink);
        sink.check()?;
    }

    finish(&mut session, &mut buffer, &mut sink, run.json, started)
}

fn run_replay(input: &Path, config: &CliConfig, run: &RunArgs) -> Result<()> {
    let file = PtuFileReader::open(input)?;
    let mut session = Session::new(file.header().calibration()?, &config.session)?;
    let mut buffer = StreamBuffer::new(config.stream.buffer_capacity);
    let mut sink = PrintSink::new(io::stdout().lock(), run.json, run.advances);
    let commands = spawn_control_reader(!run.no_control);
    let started = Instant::now();

    eprintln!(
        "Replaying: {} ({}, {} records, {:.2} MB)",
        input.display(),
        file.format().name(),
        file.record_count(),
        file.file_size() as f64 / 1_000_000.0
    );
    for chunk in file.chunks(config.stream.read_chunk_bytes) {
        apply_commands(commands.as_ref(), &mut session);
        if let Some(alert) = buffer.extend_from_slice(chunk) {
            sink.buffer_alert(alert);
        }
        session.step(&mut buffer, &mut sink);
        sink.check()?;
    }

    finish(&mut session, &mut buffer, &mut sink, run.json, started)
}

fn finish<W: io::Write>(
    session: &mut Session,
    buffer: &mut StreamBuffer,
    sink: &mut PrintSink<W>,
    json: bool,
    started: Instant,
) -> Result<()> {
    let trailing_bytes = buffer.pending_bytes();
    session.drain(buffer, sink);

    let stats: BufferStats = buffer.stats();
    let summary = Summary {
        windows: session.window_index(),
        records: session.records(),
        drops: session.drops(),
        buffer_pile_ups: stats.pile_ups,
        buffer_peak_occupancy: stats.peak_occupancy,
        trailing_bytes,
        elapsed_measurement_s: session
            .records()
            .elapsed_s(session.calibration().overflow_period_s()),
        wall_time_s: started.elapsed().as_secs_f64(),
    };

    if json {
        #[derive(Serialize)]
        struct Tagged<'a> {
            #[serde(rename = "type")]
            kind: &'static str,
            #[serde(flatten)]
            summary: &'a Summary,
        }
        sink.write_json(&Tagged {
            kind: "summary",
            summary: &summary,
        });
    } else {
        println!("{:-<65}", "");
        println!("Windows: {}", summary.windows);
        println!(
            "Records: {} ({} photons, {} overflows, {} markers)",
            summary.records.records,
            summary.records.photons,
            summary.records.overflows,
            summary.records.markers
        );
        println!(
            "Measurement time: {:.3} s (wall {:.3} s)",
            summary.elapsed_measurement_s, summary.wall_time_s
        );
        println!(
            "Dropped: {} trace, {} histogram, {} unmapped channel",
            summary.drops.trace_out_of_range,
            summary.drops.histogram_out_of_range,
            summary.drops.ignored_photons
        );
        println!(
            "Buffer: {} pile-up(s), peak {} records",
            summary.buffer_pile_ups, summary.buffer_peak_occupancy
        );
        if summary.trailing_bytes > 0 {
            println!("Trailing bytes discarded: {}", summary.trailing_bytes);
        }
    }
    sink.check()?;
    Ok(())
}

/// Reads control commands from stdin on a helper thread.
///
/// Lines that do not parse are reported on stderr and never reach the session.
fn spawn_control_reader(enabled: bool) -> Option<Receiver<ControlCommand>> {
    if !enabled {
        return None;
    }
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.parse::<ControlCommand>() {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("rejected: {e}"),
            }
        }
    });
    Some(rx)
}

fn apply_commands(commands: Option<&Receiver<ControlCommand>>, session: &mut Session) {
    let Some(commands) = commands else {
        return;
    };
    loop {
        match commands.try_recv() {
            Ok(command) => {
                if let Err(e) = session.apply(command) {
                    eprintln!("rejected: {e}");
                }
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
}

fn show_info(input: &Path, list_tags: bool) -> Result<()> {
    let file = File::open(input)?;
    let file_size = file.metadata()?.len();
    let header = PtuHeader::read(&mut BufReader::new(file))?;

    println!("File: {}", input.display());
    println!("Version: {}", header.version());
    println!(
        "Size: {} bytes ({:.2} MB)",
        file_size,
        file_size as f64 / 1_000_000.0
    );
    match header.record_format() {
        Ok(format) => println!("Record type: {} (0x{:08X})", format.name(), format.code()),
        Err(e) => println!("Record type: {e}"),
    }

    let body = file_size.saturating_sub(header.data_offset());
    println!(
        "Records in file: {}{}",
        body / 4,
        if body % 4 == 0 { "" } else { " (+ partial record)" }
    );
    if let Some(declared) = header.num_records() {
        println!("Records declared: {declared}");
    }

    match header.calibration() {
        Ok(calibration) => {
            println!(
                "Resolution: {:.1} ps",
                calibration.measurement_resolution_ps()
            );
            println!(
                "Sync: {:.3} MHz ({:.2} ns period)",
                calibration.sync_rate_hz() * 1e-6,
                calibration.global_resolution_s() * 1e9
            );
            println!(
                "Overflow period: {:.2} us ({:.2} per ms, {} per 1 ms bin)",
                calibration.overflow_period_s() * 1e6,
                calibration.overflows_per_ms(),
                calibration.overflow_units_for_ms(1)
            );
        }
        Err(e) => println!("Calibration: {e}"),
    }

    if list_tags {
        println!("{:-<65}", "");
        for tag in header.tags() {
            println!("{:<40} {}", tag.display_name(), tag.value);
        }
    }
    Ok(())
}
