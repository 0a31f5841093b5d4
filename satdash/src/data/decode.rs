//! Field decoding
//!
//! Records keep their payload as received. These helpers turn the raw
//! strings into numbers when a view is built.

use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("{field} {raw:?} is not a number")]
    NotANumber { field: &'static str, raw: String },
    #[error("expected yaw,pitch,roll but {raw:?} has {parts} part(s)")]
    Arity { raw: String, parts: usize },
}

/// Parses a decimal number, ignoring surrounding whitespace.
pub fn parse_number(field: &'static str, raw: &str) -> Result<f64, FieldError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| FieldError::NotANumber {
            field,
            raw: raw.to_string(),
        })
}

/// Decoded gyroscope payload, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attitude {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl FromStr for Attitude {
    type Err = FieldError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split(',').collect();
        if parts.len() != 3 {
            return Err(FieldError::Arity {
                raw: raw.to_string(),
                parts: parts.len(),
            });
        }
        Ok(Attitude {
            yaw: parse_number("yaw", parts[0])?,
            pitch: parse_number("pitch", parts[1])?,
            roll: parse_number("roll", parts[2])?,
        })
    }
}

/// Decodes a `yaw,pitch,roll` gyroscope value.
pub fn decode_gyro(raw: &str) -> Result<Attitude, FieldError> {
    raw.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(parse_number("value", "21.5"), Ok(21.5));
        assert_eq!(parse_number("value", " -3 "), Ok(-3.0));
        assert!(matches!(
            parse_number("time", "12:00"),
            Err(FieldError::NotANumber { field: "time", .. })
        ));
        assert!(parse_number("value", "").is_err());
    }

    #[test]
    fn gyro_triple() {
        let att = decode_gyro("1.5,2.25,-3.0").unwrap();
        assert_eq!(
            att,
            Attitude {
                yaw: 1.5,
                pitch: 2.25,
                roll: -3.0
            }
        );
    }

    #[test]
    fn gyro_wrong_arity() {
        assert_eq!(
            decode_gyro("1,2"),
            Err(FieldError::Arity {
                raw: "1,2".to_string(),
                parts: 2
            })
        );
        assert!(matches!(decode_gyro("1,2,3,4"), Err(FieldError::Arity { parts: 4, .. })));
    }

    #[test]
    fn gyro_bad_component() {
        assert!(matches!(
            decode_gyro("1,x,3"),
            Err(FieldError::NotANumber { field: "pitch", .. })
        ));
    }
}
