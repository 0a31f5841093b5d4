//! Telemetry store
//!
//! Append-only history of every record received during the process
//! lifetime, in arrival order. The ingestion thread is the only writer;
//! view building and persistence read through `Snapshot`s.
//!
//! One mutex guards the history. Records are kept behind `Arc` so that a
//! snapshot only copies pointers while the lock is held.

use crate::link::{SensorKind, SensorRecord};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Arrival sequence number. Assigned by the store, strictly increasing.
pub type Seq = u64;

/// A record as held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub seq: Seq,
    pub record: SensorRecord,
}

impl Entry {
    pub fn kind(&self) -> SensorKind {
        self.record.kind
    }
}

#[derive(Default)]
struct History {
    entries: Vec<Arc<Entry>>,
    next_seq: Seq,
}

/// Shared handle to the history. Cloning the handle shares the history.
#[derive(Clone, Default)]
pub struct TelemetryStore {
    history: Arc<Mutex<History>>,
}

impl TelemetryStore {
    pub fn new() -> TelemetryStore {
        TelemetryStore::default()
    }

    // The history is only ever pushed to, so it stays consistent even if
    // a holder of the lock panicked.
    fn lock(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a record and returns the sequence number it was given.
    pub fn append(&self, record: SensorRecord) -> Seq {
        let mut history = self.lock();
        let seq = history.next_seq;
        history.next_seq += 1;
        history.entries.push(Arc::new(Entry { seq, record }));
        seq
    }

    /// Returns a point-in-time copy of the history.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.lock().entries.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable view of the history at the time it was taken.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<Arc<Entry>>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().map(|e| e.as_ref())
    }

    /// Entries of one kind, in arrival order.
    pub fn of_kind(&self, kind: SensorKind) -> impl Iterator<Item = &Entry> {
        self.iter().filter(move |e| e.kind() == kind)
    }
}

impl FromIterator<SensorRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = SensorRecord>>(iter: I) -> Self {
        Snapshot {
            entries: iter
                .into_iter()
                .enumerate()
                .map(|(i, record)| {
                    Arc::new(Entry {
                        seq: i as Seq,
                        record,
                    })
                })
                .collect(),
        }
    }
}
