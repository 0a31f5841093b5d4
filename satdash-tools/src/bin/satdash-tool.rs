use clap::{Parser, Subcommand};
use satdash::link::port::StreamPort;
use satdash::link::{FrameError, FrameParser, LinkError};
use satdash::pipeline::{IngestExit, Ingestor};
use satdash::{data::Persister, TelemetryStore};
use satdash_tools::{init_logging, LinkOpts};

use std::fs::File;
use std::io::{prelude::*, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "satdash-tool",
    version,
    about = "Satellite telemetry link inspection, capture and replay tool"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports present on this machine
    Ports,

    /// Print raw lines received on the link
    Dump {
        #[command(flatten)]
        link: LinkOpts,
    },

    /// Print the records parsed from the link
    Frames {
        #[command(flatten)]
        link: LinkOpts,
    },

    /// Write raw lines from the link to a file
    Capture {
        #[command(flatten)]
        link: LinkOpts,

        /// Path of the capture file
        #[arg(short = 'f', default_value_t = default_capture_path())]
        file: String,

        /// Unbuffered output (flush every line)
        #[arg(short = 'u')]
        unbuffered: bool,
    },

    /// Ingest a captured file and write the per-kind CSV logs
    Replay {
        #[command(flatten)]
        link: LinkOpts,

        /// Capture file to replay
        file: PathBuf,

        /// Directory for the CSV logs (default from the config file, or .)
        #[arg(short = 'o')]
        output: Option<PathBuf>,
    },
}

fn default_capture_path() -> String {
    chrono::Local::now()
        .format("capture.%Y%m%d-%H%M%S.txt")
        .to_string()
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

fn list_ports() -> Result<(), ()> {
    let ports = serialport::available_ports().map_err(|e| {
        eprintln!("Failed to enumerate serial ports: {}", e);
    })?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(info) => println!(
                "{}  USB {:04x}:{:04x} {}",
                port.port_name,
                info.vid,
                info.pid,
                info.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

/// Calls `f` for every line until the link closes.
fn for_each_line<F>(link: &LinkOpts, mut f: F) -> Result<(), ()>
where
    F: FnMut(String) -> Result<(), ()>,
{
    let config = link.resolve().map_err(|e| {
        eprintln!("Invalid configuration: {}", e);
    })?;
    let mut port = config.open_link().map_err(|e| {
        eprintln!("Failed to open {}: {}", config.port, e);
    })?;
    loop {
        match port.next_line() {
            Ok(line) => f(line)?,
            Err(LinkError::NotReady) => continue,
            Err(e) if e.is_permanent() => {
                log::info!("link closed: {}", e);
                return Ok(());
            }
            Err(e) => log::warn!("link error: {}", e),
        }
    }
}

fn dump(link: &LinkOpts) -> Result<(), ()> {
    for_each_line(link, |line| {
        println!("{} {}", timestamp(), line);
        Ok(())
    })
}

fn frames(link: &LinkOpts) -> Result<(), ()> {
    let handshake = link
        .resolve()
        .map(|c| c.handshake)
        .map_err(|e| eprintln!("Invalid configuration: {}", e))?;
    let mut parser = FrameParser::new(&handshake);
    let (mut records, mut discarded, mut rejected) = (0u64, 0u64, 0u64);
    for_each_line(link, |line| {
        match parser.push_line(&line) {
            Ok(Some(rec)) => {
                records += 1;
                println!("{:<14} {:>12} {}", rec.kind, rec.time, rec.value);
            }
            Ok(None) => {}
            Err(FrameError::Handshake(_)) => discarded += 1,
            Err(e) => {
                rejected += 1;
                eprintln!("{}", e);
            }
        }
        Ok(())
    })?;
    eprintln!(
        "{} records, {} lines outside frames, {} rejected frames",
        records, discarded, rejected
    );
    Ok(())
}

fn capture(link: &LinkOpts, file: String, unbuffered: bool) -> Result<(), ()> {
    let mut out = BufWriter::new(File::create(&file).map_err(|e| {
        eprintln!("create failed: {}", e);
    })?);
    println!("Capturing to {}...", file);
    for_each_line(link, |line| {
        writeln!(out, "{}", line).map_err(|e| eprintln!("write error: {}", e))?;
        if unbuffered {
            out.flush().map_err(|e| eprintln!("flush error: {}", e))?;
        }
        Ok(())
    })?;
    out.flush().map_err(|e| eprintln!("flush error: {}", e))
}

/// Why a replay did not reach the end of its file, if it didn't.
fn replay_failure(exit: &IngestExit, file: &Path) -> Option<String> {
    match exit {
        IngestExit::LinkClosed(LinkError::Disconnected) => None,
        IngestExit::LinkClosed(e) => Some(format!("Read failed: {}", e)),
        IngestExit::Stopped => Some(format!(
            "Replay stopped before the end of {}",
            file.display()
        )),
        IngestExit::Panicked => Some("Ingestion thread panicked".to_string()),
    }
}

fn replay(link: &LinkOpts, file: PathBuf, output: Option<PathBuf>) -> Result<(), ()> {
    let config = link.resolve().map_err(|e| {
        eprintln!("Invalid configuration: {}", e);
    })?;
    let input = File::open(&file).map_err(|e| {
        eprintln!("Failed to open {}: {}", file.display(), e);
    })?;

    let store = TelemetryStore::new();
    let report = Ingestor::new(StreamPort::new(input), store.clone(), config.ingest_config())
        .run_to_end();
    if let Some(reason) = replay_failure(&report.exit, &file) {
        eprintln!("{}", reason);
        return Err(());
    }
    println!(
        "{} lines, {} records, {} rejected frames",
        report.stats.lines, report.stats.records, report.stats.rejected_frames
    );

    let mut persister = Persister::new(output.unwrap_or(config.output_dir));
    println!("Saving to {}", persister.dir().display());
    let report = persister.persist(&store.snapshot());
    for (kind, outcome) in &report.outcomes {
        println!("{:<14} {:?}", kind, outcome);
    }
    let mut failed = false;
    for (kind, e) in report.failures() {
        eprintln!("Failed to save {} data: {}", kind, e);
        failed = true;
    }
    if failed {
        Err(())
    } else {
        Ok(())
    }
}

fn main() -> ExitCode {
    init_logging("info");
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ports => list_ports(),
        Commands::Dump { link } => dump(&link),
        Commands::Frames { link } => frames(&link),
        Commands::Capture {
            link,
            file,
            unbuffered,
        } => capture(&link, file, unbuffered),
        Commands::Replay { link, file, output } => replay(&link, file, output),
    };

    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        eprintln!("FAILED");
        ExitCode::FAILURE
    }
}
