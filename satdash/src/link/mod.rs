pub mod port;
pub mod proto;

pub use port::{LineSource, LinkError};
pub use proto::{FrameError, FrameParser, FrameState, SensorKind, SensorRecord};
