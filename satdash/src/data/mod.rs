mod decode;
mod export;
mod orientation;
mod store;
mod view;

pub use decode::{decode_gyro, parse_number, Attitude, FieldError};
pub use export::{KindPersist, PersistError, PersistReport, Persister, SaveTrigger, LOG_HEADER};
pub use orientation::{MeshTransform, Orientation};
pub use store::{Entry, Seq, Snapshot, TelemetryStore};
pub use view::{
    build_view, GaugeBand, GaugeSpec, KindStatus, RadialIndicator, SensorView, SeriesPoint,
    VELOCITY_FULL_SCALE,
};
