//! Dashboard
//!
//! Read side of the pipeline: owns the state shared between refresh ticks
//! and save requests, and hands out finished views.
//!
//! - `refresh()` builds a new `SensorView` from a store snapshot and
//!   publishes it in one step. Refreshes are serialized, so two ticks never
//!   compose a view at the same time.
//! - `request_save()` debounces the external save counter and appends new
//!   rows to the per-kind CSV logs. Saves are serialized as well.
//!
//! Share it between threads with an `Arc<Dashboard>`.

use crate::data::{
    build_view, Orientation, PersistReport, Persister, SaveTrigger, SensorView, TelemetryStore,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

struct SaveState {
    persister: Persister,
    trigger: SaveTrigger,
}

pub struct Dashboard {
    store: TelemetryStore,
    /// Orientation carried between ticks. Holding this lock is what makes
    /// a tick exclusive.
    tick: Mutex<Orientation>,
    published: RwLock<Arc<SensorView>>,
    save: Mutex<SaveState>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Dashboard {
    /// `output_dir` is where the per-kind CSV logs are written.
    pub fn new<P: Into<PathBuf>>(store: TelemetryStore, output_dir: P) -> Dashboard {
        Dashboard {
            store,
            tick: Mutex::new(Orientation::default()),
            published: RwLock::new(Arc::new(SensorView::default())),
            save: Mutex::new(SaveState {
                persister: Persister::new(output_dir),
                trigger: SaveTrigger::new(),
            }),
        }
    }

    /// Builds and publishes the view for one refresh tick.
    pub fn refresh(&self) -> Arc<SensorView> {
        let mut orientation = lock(&self.tick);
        let snapshot = self.store.snapshot();
        let view = Arc::new(build_view(&snapshot, *orientation));
        *orientation = view.orientation;
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = view.clone();
        view
    }

    /// The most recently published view.
    pub fn current(&self) -> Arc<SensorView> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn orientation(&self) -> Orientation {
        *lock(&self.tick)
    }

    /// Handles the external save counter. Returns the report when the
    /// count triggered a save.
    pub fn request_save(&self, count: u64) -> Option<PersistReport> {
        let mut save = lock(&self.save);
        if !save.trigger.fire(count) {
            return None;
        }
        let snapshot = self.store.snapshot();
        Some(save.persister.persist(&snapshot))
    }

    /// Saves unconditionally.
    pub fn save_now(&self) -> PersistReport {
        let mut save = lock(&self.save);
        let snapshot = self.store.snapshot();
        save.persister.persist(&snapshot)
    }
}
