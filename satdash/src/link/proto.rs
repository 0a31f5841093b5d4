//! Telemetry framing protocol
//!
//! Each record travels over the link as four text lines:
//!
//! ```text
//! panditas        <- handshake token
//! 12.5            <- timestamp
//! temperature     <- sensor type
//! 21.7            <- value (yaw,pitch,roll for the gyroscope)
//! ```
//!
//! The handshake must match exactly. A first line that does not match is
//! dropped on its own and the next line is tried as a handshake, so a
//! receiver joining mid-stream realigns at the next frame. Payload lines are
//! kept verbatim; numeric interpretation happens when views are built.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Handshake token the flight software sends ahead of every frame.
pub static DEFAULT_HANDSHAKE: &str = "panditas";

/// The sensors known to the ground station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorKind {
    Temperature,
    Pressure,
    Velocity,
    Light,
    Accelerometer,
    Gyroscope,
}

impl SensorKind {
    pub const ALL: [SensorKind; 6] = [
        SensorKind::Temperature,
        SensorKind::Pressure,
        SensorKind::Velocity,
        SensorKind::Light,
        SensorKind::Accelerometer,
        SensorKind::Gyroscope,
    ];

    /// Name used on the wire and in log file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Pressure => "pressure",
            SensorKind::Velocity => "velocity",
            SensorKind::Light => "light",
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
        }
    }

    /// File name of the persisted log for this kind.
    pub fn log_file_name(&self) -> String {
        format!("{}_data.csv", self.as_str())
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| FrameError::UnknownKind(s.to_string()))
    }
}

/// One telemetry reading as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRecord {
    pub time: String,
    pub kind: SensorKind,
    pub value: String,
}

impl SensorRecord {
    pub fn new(time: &str, kind: SensorKind, value: &str) -> SensorRecord {
        SensorRecord {
            time: time.to_string(),
            kind,
            value: value.to_string(),
        }
    }

    /// Encodes the record as a complete frame, newline terminated.
    pub fn to_frame(&self, handshake: &str) -> String {
        format!("{}\n{}\n{}\n{}\n", handshake, self.time, self.kind, self.value)
    }
}

/// Reasons a frame yields no record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The first line of a frame was not the handshake. Expected while
    /// realigning; callers should not treat it as a failure.
    #[error("expected handshake, got {0:?}")]
    Handshake(String),
    /// The frame was complete but named a sensor we don't know.
    #[error("unknown sensor type {0:?}")]
    UnknownKind(String),
}

/// Position inside the four line frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameState {
    AwaitingHandshake,
    ReadingPayload(PayloadField),
}

/// Next payload line expected, with the lines collected so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadField {
    Time,
    Kind { time: String },
    Value { time: String, kind: String },
}

/// Incremental frame parser. Lines are pushed one at a time; a record is
/// returned when the value line of a well formed frame arrives.
#[derive(Debug, Clone)]
pub struct FrameParser {
    handshake: String,
    state: FrameState,
}

impl Default for FrameParser {
    fn default() -> Self {
        FrameParser::new(DEFAULT_HANDSHAKE)
    }
}

impl FrameParser {
    pub fn new(handshake: &str) -> FrameParser {
        FrameParser {
            handshake: handshake.to_string(),
            state: FrameState::AwaitingHandshake,
        }
    }

    pub fn state(&self) -> &FrameState {
        &self.state
    }

    pub fn awaiting_handshake(&self) -> bool {
        self.state == FrameState::AwaitingHandshake
    }

    /// Feeds one line. Returns `Ok(Some(record))` when a frame completes,
    /// `Ok(None)` while a frame is in progress.
    pub fn push_line(&mut self, line: &str) -> Result<Option<SensorRecord>, FrameError> {
        let state = std::mem::replace(&mut self.state, FrameState::AwaitingHandshake);
        match state {
            FrameState::AwaitingHandshake => {
                if line != self.handshake {
                    return Err(FrameError::Handshake(line.to_string()));
                }
                self.state = FrameState::ReadingPayload(PayloadField::Time);
                Ok(None)
            }
            FrameState::ReadingPayload(PayloadField::Time) => {
                self.state = FrameState::ReadingPayload(PayloadField::Kind {
                    time: line.to_string(),
                });
                Ok(None)
            }
            FrameState::ReadingPayload(PayloadField::Kind { time }) => {
                self.state = FrameState::ReadingPayload(PayloadField::Value {
                    time,
                    kind: line.to_string(),
                });
                Ok(None)
            }
            FrameState::ReadingPayload(PayloadField::Value { time, kind }) => {
                let kind = kind.parse::<SensorKind>()?;
                Ok(Some(SensorRecord {
                    time,
                    kind,
                    value: line.to_string(),
                }))
            }
        }
    }

    /// Drops any partially read frame. Returns whether there was one.
    pub fn abort(&mut self) -> bool {
        let partial = !self.awaiting_handshake();
        self.state = FrameState::AwaitingHandshake;
        partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut FrameParser, lines: &[&str]) -> Vec<Result<Option<SensorRecord>, FrameError>> {
        lines.iter().map(|l| parser.push_line(l)).collect()
    }

    #[test]
    fn valid_frame_yields_verbatim_record() {
        let mut parser = FrameParser::default();
        let out = feed(&mut parser, &["panditas", "12.5", "gyroscope", "1.5,2.25,-3.0"]);
        assert!(out[..3].iter().all(|r| matches!(r, Ok(None))));
        assert_eq!(
            out[3],
            Ok(Some(SensorRecord::new("12.5", SensorKind::Gyroscope, "1.5,2.25,-3.0")))
        );
        assert!(parser.awaiting_handshake());
    }

    #[test]
    fn mismatched_handshake_consumes_one_line() {
        let mut parser = FrameParser::default();
        assert_eq!(
            parser.push_line("pandita"),
            Err(FrameError::Handshake("pandita".to_string()))
        );
        assert!(parser.awaiting_handshake());
        // The following lines are not taken as a payload.
        assert!(parser.push_line("1").is_err());
        assert!(parser.push_line("light").is_err());
        // Realigns on the next handshake.
        let out = feed(&mut parser, &["panditas", "2", "light", "300"]);
        assert_eq!(out[3], Ok(Some(SensorRecord::new("2", SensorKind::Light, "300"))));
    }

    #[test]
    fn unknown_kind_rejects_whole_frame() {
        let mut parser = FrameParser::default();
        let out = feed(&mut parser, &["panditas", "1", "humidity", "40"]);
        assert_eq!(out[3], Err(FrameError::UnknownKind("humidity".to_string())));
        assert!(parser.awaiting_handshake());
    }

    #[test]
    fn custom_handshake() {
        let mut parser = FrameParser::new("SYNC");
        assert!(parser.push_line("panditas").is_err());
        assert_eq!(parser.push_line("SYNC"), Ok(None));
        assert_eq!(
            parser.state(),
            &FrameState::ReadingPayload(PayloadField::Time)
        );
    }

    #[test]
    fn abort_reports_partial_frame() {
        let mut parser = FrameParser::default();
        assert!(!parser.abort());
        parser.push_line("panditas").unwrap();
        parser.push_line("7").unwrap();
        assert!(parser.abort());
        assert!(parser.awaiting_handshake());
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in SensorKind::ALL {
            assert_eq!(kind.as_str().parse::<SensorKind>(), Ok(kind));
        }
        assert_eq!(SensorKind::Pressure.log_file_name(), "pressure_data.csv");
    }

    #[test]
    fn to_frame_parses_back() {
        let record = SensorRecord::new("3", SensorKind::Velocity, "-2.5");
        let mut parser = FrameParser::default();
        let frame = record.to_frame(DEFAULT_HANDSHAKE);
        let mut last = Ok(None);
        for line in frame.lines() {
            last = parser.push_line(line);
        }
        assert_eq!(last, Ok(Some(record)));
    }
}
