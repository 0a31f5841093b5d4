//! Ingestion
//!
//! Drives a `LineSource` through a `FrameParser` into the `TelemetryStore`.
//! `spawn()` runs this on a dedicated thread for the lifetime of the link.
//!
//! Failure handling:
//! - lines outside a frame are dropped quietly, the parser realigns on
//!   the next handshake;
//! - frames naming an unknown sensor are dropped with a warning;
//! - retryable transport errors abandon the frame in progress, are logged,
//!   and reading resumes after `retry_delay`;
//! - a permanently closed link ends the thread.
//!
//! The stop signal is checked whenever the parser is between frames, and
//! when the link is idle.

use crate::data::{Seq, TelemetryStore};
use crate::link::proto::DEFAULT_HANDSHAKE;
use crate::link::{FrameError, FrameParser, LineSource, LinkError};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Token expected on the first line of every frame.
    pub handshake: String,
    /// Pause after a retryable transport error.
    pub retry_delay: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            handshake: DEFAULT_HANDSHAKE.to_string(),
            retry_delay: Duration::from_millis(10),
        }
    }
}

/// Counters kept by the ingestion loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    /// Lines read from the link.
    pub lines: u64,
    /// Records stored.
    pub records: u64,
    /// Lines dropped while waiting for a handshake.
    pub discarded_lines: u64,
    /// Complete frames rejected, e.g. for an unknown sensor type.
    pub rejected_frames: u64,
    /// Frames cut short by a transport error.
    pub abandoned_frames: u64,
    /// Retryable transport errors.
    pub transport_errors: u64,
}

#[derive(Debug)]
pub enum IngestExit {
    /// The stop signal was received.
    Stopped,
    /// The link closed for good.
    LinkClosed(LinkError),
    /// The ingestion thread panicked.
    Panicked,
}

#[derive(Debug)]
pub struct IngestReport {
    pub stats: IngestStats,
    pub exit: IngestExit,
}

/// Outcome of a single `Ingestor::step()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The link had nothing to read.
    Idle,
    /// A line was consumed without completing a record.
    Line,
    /// A record was stored with this sequence number.
    Stored(Seq),
    /// A transport error was handled.
    Recovered,
}

pub struct Ingestor<S: LineSource> {
    source: S,
    parser: FrameParser,
    store: TelemetryStore,
    config: IngestConfig,
    stats: IngestStats,
}

impl<S: LineSource> Ingestor<S> {
    pub fn new(source: S, store: TelemetryStore, config: IngestConfig) -> Ingestor<S> {
        Ingestor {
            source,
            parser: FrameParser::new(&config.handshake),
            store,
            config,
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Reads one line and acts on it. Only a permanent link failure is
    /// returned as an error.
    pub fn step(&mut self) -> Result<Progress, LinkError> {
        let line = match self.source.next_line() {
            Ok(line) => line,
            Err(LinkError::NotReady) => return Ok(Progress::Idle),
            Err(e) if e.is_permanent() => {
                if self.parser.abort() {
                    self.stats.abandoned_frames += 1;
                }
                return Err(e);
            }
            Err(e) => {
                self.stats.transport_errors += 1;
                if self.parser.abort() {
                    self.stats.abandoned_frames += 1;
                    log::warn!("frame abandoned: {}", e);
                } else {
                    log::warn!("link error: {}", e);
                }
                if !self.config.retry_delay.is_zero() {
                    thread::sleep(self.config.retry_delay);
                }
                return Ok(Progress::Recovered);
            }
        };

        self.stats.lines += 1;
        match self.parser.push_line(&line) {
            Ok(Some(record)) => {
                log::debug!(
                    "stored {} record at {}: {}",
                    record.kind,
                    record.time,
                    record.value
                );
                self.stats.records += 1;
                Ok(Progress::Stored(self.store.append(record)))
            }
            Ok(None) => Ok(Progress::Line),
            Err(FrameError::Handshake(line)) => {
                log::trace!("discarding line outside of a frame: {:?}", line);
                self.stats.discarded_lines += 1;
                Ok(Progress::Line)
            }
            Err(e) => {
                log::warn!("rejected frame: {}", e);
                self.stats.rejected_frames += 1;
                Ok(Progress::Line)
            }
        }
    }

    /// Runs until `stop` fires (or its sender is dropped) or the link
    /// closes.
    pub fn run(mut self, stop: &Receiver<()>) -> IngestReport {
        loop {
            let progress = match self.step() {
                Ok(progress) => progress,
                Err(e) => {
                    log::error!("telemetry link closed: {}", e);
                    return IngestReport {
                        stats: self.stats,
                        exit: IngestExit::LinkClosed(e),
                    };
                }
            };
            if self.parser.awaiting_handshake() || progress == Progress::Idle {
                match stop.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => {
                        if self.parser.abort() {
                            self.stats.abandoned_frames += 1;
                        }
                        return IngestReport {
                            stats: self.stats,
                            exit: IngestExit::Stopped,
                        };
                    }
                    Err(TryRecvError::Empty) => {}
                }
            }
        }
    }

    /// Runs until the link closes. Meant for finite sources such as
    /// captured files.
    pub fn run_to_end(self) -> IngestReport {
        self.run(&channel::never())
    }
}

/// Handle to an ingestion thread.
pub struct IngestHandle {
    stop: Sender<()>,
    thread: JoinHandle<IngestReport>,
}

impl IngestHandle {
    /// Asks the thread to stop at the next frame boundary.
    pub fn stop(&self) {
        // The thread may already be gone; that's fine.
        let _ = self.stop.try_send(());
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the thread to end on its own.
    pub fn join(self) -> IngestReport {
        let IngestHandle { stop, thread } = self;
        let report = thread.join();
        drop(stop);
        report.unwrap_or_else(|_| IngestReport {
            stats: IngestStats::default(),
            exit: IngestExit::Panicked,
        })
    }

    /// Stops the thread and waits for it.
    pub fn shutdown(self) -> IngestReport {
        self.stop();
        self.join()
    }
}

/// Starts ingesting `source` into `store` on a new thread.
pub fn spawn<S>(source: S, store: TelemetryStore, config: IngestConfig) -> io::Result<IngestHandle>
where
    S: LineSource + Send + 'static,
{
    let (stop_tx, stop_rx) = channel::bounded::<()>(1);
    let ingestor = Ingestor::new(source, store, config);
    let thread = thread::Builder::new()
        .name("ingest".to_string())
        .spawn(move || ingestor.run(&stop_rx))?;
    Ok(IngestHandle {
        stop: stop_tx,
        thread,
    })
}
