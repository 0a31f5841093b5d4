mod dashboard;
mod ingest;

pub use dashboard::Dashboard;
pub use ingest::{spawn, IngestConfig, IngestExit, IngestHandle, IngestReport, IngestStats, Ingestor, Progress};
