use satdash::data::{GaugeBand, KindStatus, PersistReport, SensorView};
use satdash::pipeline::{self, IngestExit, IngestHandle};
use satdash::{Dashboard, SensorKind, TelemetryStore};
use satdash_tools::{init_logging, Config, LinkOpts};

use clap::Parser;
use std::io::{stdout, Stdout, Write};
use std::process::ExitCode;
use std::sync::Arc;

use futures::{future::FutureExt, select, StreamExt};
use futures_timer::Delay;

use crossterm::ExecutableCommand;
use crossterm::{
    cursor::*,
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    style::*,
    terminal::*,
};

#[derive(Parser, Debug)]
#[command(
    name = "satdash-monitor",
    version,
    about = "Live terminal dashboard for satellite sensor telemetry"
)]
struct Cli {
    #[command(flatten)]
    link: LinkOpts,

    /// Refresh period in milliseconds (default from the config file, or 35)
    #[arg(short = 't', long = "tick")]
    tick_ms: Option<u64>,
}

/// Unit axes of the satellite body, rotated each tick to show its attitude.
const BODY_AXES: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

fn status_text(status: &KindStatus) -> &'static str {
    match status {
        KindStatus::Fresh => "",
        KindStatus::Missing => "(no data)",
        KindStatus::Degraded(_) => "(bad data)",
    }
}

fn gauge_bar(proportion: f64, width: usize) -> String {
    let filled = ((proportion.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), " ".repeat(width - filled))
}

fn view_lines(view: &SensorView) -> Vec<String> {
    let mut lines = Vec::new();
    let status = |kind| status_text(view.status(kind));

    lines.push(format!(
        " Temperature    {:>10.2}   {} points {}",
        view.temperature_latest,
        view.temperature_series.len(),
        status(SensorKind::Temperature)
    ));
    lines.push(match &view.pressure_gauge {
        Some(gauge) => format!(
            " Pressure       {:>10.2}   {} {} {}",
            gauge.value,
            gauge_bar((gauge.value - gauge.min) / (gauge.max - gauge.min), 20),
            match gauge.band {
                Some(GaugeBand::Low) => "low",
                Some(GaugeBand::High) => "high",
                None => "off scale",
            },
            status(SensorKind::Pressure)
        ),
        None => format!(" Pressure       {:>10}   {}", "-", status(SensorKind::Pressure)),
    });
    lines.push(match &view.velocity_indicator {
        Some(v) => format!(
            " Velocity       {:>10}   {}",
            v.label,
            gauge_bar(v.proportion, 20)
        ),
        None => format!(" Velocity       {:>10}   {}", "-", status(SensorKind::Velocity)),
    });
    lines.push(format!(
        " Light          {:>10.2}   {}",
        view.light_latest,
        status(SensorKind::Light)
    ));
    lines.push(format!(
        " Accelerometer  {:>10.2}   {}",
        view.accelerometer_latest,
        status(SensorKind::Accelerometer)
    ));
    lines.push(format!(
        " Yaw {:>8}  Pitch {:>8}  Roll {:>8}   {}",
        view.yaw_text,
        view.pitch_text,
        view.roll_text,
        status(SensorKind::Gyroscope)
    ));
    lines.push(String::new());
    let axes = view.mesh_transform.apply_all(&BODY_AXES);
    for (name, p) in ["x", "y", "z"].iter().zip(axes) {
        lines.push(format!(
            " Body {}  {:>8.3} {:>8.3} {:>8.3}",
            name, p[0], p[1], p[2]
        ));
    }
    lines
}

fn draw(stdout: &mut Stdout, header: &str, view: &SensorView, footer: &str) {
    _ = stdout.execute(MoveTo(0, 0));
    _ = stdout.execute(Clear(ClearType::CurrentLine));
    print!("{}", header);
    let mut row: u16 = 2;
    for line in view_lines(view) {
        _ = stdout.execute(MoveTo(0, row));
        _ = stdout.execute(Clear(ClearType::CurrentLine));
        print!("{}", line);
        row += 1;
    }
    _ = stdout.execute(MoveTo(0, row + 1));
    _ = stdout.execute(Clear(ClearType::CurrentLine));
    print!("{}", footer);
    _ = stdout.flush();
}

fn save_summary(report: &PersistReport) -> String {
    let failed: Vec<String> = report.failures().map(|(kind, _)| kind.to_string()).collect();
    if failed.is_empty() {
        format!("saved {} new rows", report.rows_written())
    } else {
        format!(
            "saved {} new rows, failed: {}",
            report.rows_written(),
            failed.join(", ")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Quit,
    Save,
    Ignore,
}

/// Maps a key event to what the monitor should do. Only presses count,
/// some platforms also report releases.
fn key_action(key: &KeyEvent) -> KeyAction {
    if key.kind != KeyEventKind::Press {
        return KeyAction::Ignore;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => KeyAction::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
        KeyCode::Char('s') => KeyAction::Save,
        _ => KeyAction::Ignore,
    }
}

/// Refreshes the view for one tick. Returns `None` once the ingestion
/// thread has ended, i.e. the link is gone for good.
fn tick(dash: &Dashboard, handle: &IngestHandle) -> Option<Arc<SensorView>> {
    if handle.is_finished() {
        return None;
    }
    Some(dash.refresh())
}

async fn run_monitor(dash: Arc<Dashboard>, handle: &IngestHandle, config: &Config) {
    let mut reader = EventStream::new();
    let mut stdout = stdout();
    let mut saves: u64 = 0;
    let mut footer = String::from(" s: save   q: quit");

    'drawing: loop {
        let mut delay = Delay::new(config.tick()).fuse();
        let mut event = reader.next().fuse();

        select! {
            _ = delay => {
                let view = match tick(&dash, handle) {
                    Some(view) => view,
                    None => break 'drawing,
                };
                let header = format!("Link: {}   Records: {}", config.port, view.records);
                draw(&mut stdout, &header, &view, &footer);
            },
            some_event = event => {
                match some_event {
                    Some(Ok(Event::Key(key))) => match key_action(&key) {
                        KeyAction::Quit => break 'drawing,
                        KeyAction::Save => {
                            saves += 1;
                            if let Some(report) = dash.request_save(saves) {
                                footer = format!(" s: save   q: quit   {}", save_summary(&report));
                            }
                        }
                        KeyAction::Ignore => {}
                    },
                    Some(Ok(_)) => {}
                    Some(Err(e)) => log::error!("terminal event error: {}", e),
                    None => break 'drawing,
                }
            }
        }
    }
}

fn main() -> ExitCode {
    // Log output would scribble over the dashboard, so only errors by default.
    init_logging("error");
    let cli = Cli::parse();

    let mut config = match cli.link.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(tick_ms) = cli.tick_ms {
        config.tick_ms = tick_ms;
    }

    let link = match config.open_link() {
        Ok(link) => link,
        Err(e) => {
            eprintln!("Failed to open {}: {}", config.port, e);
            return ExitCode::FAILURE;
        }
    };

    let store = TelemetryStore::new();
    let dash = Arc::new(Dashboard::new(store.clone(), config.output_dir.clone()));
    let handle = match pipeline::spawn(link, store, config.ingest_config()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to start ingestion: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_terminal() {
        eprintln!("Failed to set up terminal: {}", e);
        handle.shutdown();
        return ExitCode::FAILURE;
    }

    async_std::task::block_on(run_monitor(dash, &handle, &config));

    let terminal = restore_terminal();
    let report = handle.shutdown();
    if let Err(e) = terminal {
        eprintln!("Failed to restore terminal: {}", e);
    }

    println!(
        "{} lines, {} records, {} rejected frames, {} abandoned frames",
        report.stats.lines,
        report.stats.records,
        report.stats.rejected_frames,
        report.stats.abandoned_frames
    );
    match report.exit {
        IngestExit::Stopped => ExitCode::SUCCESS,
        IngestExit::LinkClosed(e) => {
            eprintln!("Link closed: {}", e);
            ExitCode::FAILURE
        }
        IngestExit::Panicked => {
            eprintln!("FAILED");
            ExitCode::FAILURE
        }
    }
}

fn setup_terminal() -> std::io::Result<()> {
    let mut stdout = stdout();
    enable_raw_mode()?;
    stdout.execute(EnterAlternateScreen)?;
    stdout.execute(SetBackgroundColor(Color::Black))?;
    stdout.execute(SetForegroundColor(Color::White))?;
    stdout.execute(Clear(ClearType::All))?;
    stdout.execute(Hide)?;
    Ok(())
}

fn restore_terminal() -> std::io::Result<()> {
    let mut stdout = stdout();
    stdout.execute(ResetColor)?;
    stdout.execute(LeaveAlternateScreen)?;
    stdout.execute(Show)?;
    disable_raw_mode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use satdash::link::port::StreamPort;
    use satdash::pipeline::IngestConfig;
    use satdash::SensorRecord;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn gauge_bar_fills_proportionally() {
        assert_eq!(gauge_bar(0.0, 4), "[    ]");
        assert_eq!(gauge_bar(0.5, 4), "[##  ]");
        assert_eq!(gauge_bar(2.0, 4), "[####]");
    }

    #[test]
    fn view_lines_show_missing_kinds() {
        let store = TelemetryStore::new();
        store.append(SensorRecord::new("1", SensorKind::Pressure, "75"));
        let dir = tempfile::tempdir().unwrap();
        let dash = Dashboard::new(store, dir.path());
        let lines = view_lines(&dash.refresh());
        assert!(lines[0].contains("(no data)"));
        assert!(lines[1].contains("high"));
        assert!(lines[2].contains("(no data)"));
        assert!(lines[7].starts_with(" Body x     1.000"));
    }

    #[test]
    fn closed_link_ends_the_monitor() {
        let store = TelemetryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let dash = Dashboard::new(store.clone(), dir.path());
        let input = "panditas\n1\nlight\n300\n";
        let handle = pipeline::spawn(
            StreamPort::new(input.as_bytes()),
            store,
            IngestConfig::default(),
        )
        .unwrap();
        while !handle.is_finished() {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(tick(&dash, &handle).is_none());
        let report = handle.shutdown();
        assert!(matches!(report.exit, IngestExit::LinkClosed(_)));
        assert_eq!(report.stats.records, 1);
    }

    #[test]
    fn keys_act_on_press_only() {
        let press = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(key_action(&press(KeyCode::Char('s'))), KeyAction::Save);
        assert_eq!(key_action(&press(KeyCode::Char('q'))), KeyAction::Quit);
        assert_eq!(key_action(&press(KeyCode::Esc)), KeyAction::Quit);
        assert_eq!(key_action(&press(KeyCode::Char('c'))), KeyAction::Ignore);
        assert_eq!(
            key_action(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            KeyAction::Quit
        );
        let release =
            KeyEvent::new_with_kind(KeyCode::Char('s'), KeyModifiers::NONE, KeyEventKind::Release);
        assert_eq!(key_action(&release), KeyAction::Ignore);
    }
}
