pub mod data;
pub mod link;
pub mod pipeline;

pub use data::{SensorView, TelemetryStore};
pub use link::{SensorKind, SensorRecord};
pub use pipeline::Dashboard;
