//! Incremental CSV export
//!
//! Each sensor kind is saved to its own append-only CSV file,
//! `<kind>_data.csv`, with a `time,sensor_type,value` header written when
//! the file is created. Every save appends only the rows that are not in
//! the file yet.
//!
//! The persister remembers, per kind, the sequence number of the last row
//! it wrote. The first time a kind is saved in a process and its file
//! already exists, the file's last row is looked up among the in-memory
//! rows to find where to resume: writing continues after the last exact
//! match, and without a match everything is appended.

use super::store::{Entry, Seq, Snapshot};
use crate::link::SensorKind;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const LOG_HEADER: [&str; 3] = ["time", "sensor_type", "value"];

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("{}: {source}", path.display())]
    IO {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Result of saving one sensor kind.
#[derive(Debug)]
pub enum KindPersist {
    /// This many rows were appended.
    Appended(usize),
    /// Everything in memory is already in the file.
    UpToDate,
    /// No rows of this kind in memory.
    NoData,
    Failed(PersistError),
}

#[derive(Debug, Default)]
pub struct PersistReport {
    pub outcomes: BTreeMap<SensorKind, KindPersist>,
}

impl PersistReport {
    pub fn rows_written(&self) -> usize {
        self.outcomes
            .values()
            .map(|o| match o {
                KindPersist::Appended(n) => *n,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (SensorKind, &PersistError)> {
        self.outcomes.iter().filter_map(|(kind, o)| match o {
            KindPersist::Failed(e) => Some((*kind, e)),
            _ => None,
        })
    }
}

pub struct Persister {
    dir: PathBuf,
    watermarks: HashMap<SensorKind, Seq>,
}

impl Persister {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Persister {
        Persister {
            dir: dir.into(),
            watermarks: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self, kind: SensorKind) -> PathBuf {
        self.dir.join(kind.log_file_name())
    }

    /// Appends new rows of every kind. A failure on one kind does not stop
    /// the others.
    pub fn persist(&mut self, snapshot: &Snapshot) -> PersistReport {
        let mut report = PersistReport::default();
        if snapshot.is_empty() {
            log::info!("No data to save.");
        }
        for kind in SensorKind::ALL {
            let outcome = match self.persist_kind(kind, snapshot) {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("failed to save {} data: {}", kind, e);
                    // Resynchronize from the file next time, since part of
                    // the rows may have been written.
                    self.watermarks.remove(&kind);
                    KindPersist::Failed(e)
                }
            };
            match &outcome {
                KindPersist::Appended(n) => {
                    log::info!("{} new rows appended to {}", n, kind.log_file_name())
                }
                KindPersist::UpToDate => log::debug!("No new data to append for {}", kind),
                KindPersist::NoData => log::debug!("No data to save for {}", kind),
                KindPersist::Failed(_) => {}
            }
            report.outcomes.insert(kind, outcome);
        }
        report
    }

    fn persist_kind(
        &mut self,
        kind: SensorKind,
        snapshot: &Snapshot,
    ) -> Result<KindPersist, PersistError> {
        let rows: Vec<&Entry> = snapshot.of_kind(kind).collect();
        let Some(last) = rows.last() else {
            return Ok(KindPersist::NoData);
        };
        let last_seq = last.seq;

        let path = self.log_path(kind);
        let existing_len = match fs::metadata(&path) {
            Ok(meta) => Some(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(source) => return Err(PersistError::IO { path, source }),
        };

        let start = match (existing_len, self.watermarks.get(&kind)) {
            (None, _) => 0,
            (Some(_), Some(&mark)) => rows.iter().position(|e| e.seq > mark).unwrap_or(rows.len()),
            (Some(_), None) => match read_last_row(&path)? {
                Some(last_row) => rows
                    .iter()
                    .rposition(|e| row_matches(e, &last_row))
                    .map(|i| i + 1)
                    .unwrap_or(0),
                None => 0,
            },
        };

        let new_rows = &rows[start..];
        if new_rows.is_empty() {
            self.watermarks.insert(kind, last_seq);
            return Ok(KindPersist::UpToDate);
        }

        let write_header = existing_len.unwrap_or(0) == 0;
        append_rows(&path, write_header, new_rows)?;
        self.watermarks.insert(kind, last_seq);
        Ok(KindPersist::Appended(new_rows.len()))
    }
}

fn row_matches(entry: &Entry, row: &csv::StringRecord) -> bool {
    row.len() == 3
        && row[0] == entry.record.time
        && row[1] == *entry.record.kind.as_str()
        && row[2] == entry.record.value
}

fn read_last_row(path: &Path) -> Result<Option<csv::StringRecord>, PersistError> {
    let csv_err = |source| PersistError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    let mut last = None;
    for row in reader.records() {
        last = Some(row.map_err(csv_err)?);
    }
    Ok(last)
}

fn append_rows(path: &Path, write_header: bool, rows: &[&Entry]) -> Result<(), PersistError> {
    let file: File = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|source| PersistError::IO {
            path: path.to_path_buf(),
            source,
        })?;
    let csv_err = |source| PersistError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file);
    if write_header {
        writer.write_record(LOG_HEADER).map_err(csv_err)?;
    }
    for e in rows {
        writer
            .write_record([
                e.record.time.as_str(),
                e.record.kind.as_str(),
                e.record.value.as_str(),
            ])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| PersistError::IO {
        path: path.to_path_buf(),
        source,
    })
}

/// Debounces the external save counter. A save happens when the counter
/// goes above the last count seen; zero never triggers.
#[derive(Debug, Default, Clone)]
pub struct SaveTrigger {
    last_seen: u64,
}

impl SaveTrigger {
    pub fn new() -> SaveTrigger {
        SaveTrigger::default()
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    /// Returns whether `count` asks for a save.
    pub fn fire(&mut self, count: u64) -> bool {
        if count == 0 || count <= self.last_seen {
            return false;
        }
        self.last_seen = count;
        true
    }
}
