//! Sensor views
//!
//! `build_view` turns a store snapshot into everything the display needs
//! for one refresh. Each sensor kind is derived on its own: a kind with no
//! data gets its default, and a kind whose fields fail to convert is
//! degraded to its default and reported in `SensorView::status`. Neither
//! affects the other kinds.

use super::decode::{decode_gyro, parse_number, FieldError};
use super::orientation::{MeshTransform, Orientation};
use super::store::{Entry, Snapshot};
use crate::link::SensorKind;
use std::collections::BTreeMap;

/// Velocity magnitude at which the radial indicator is full.
pub const VELOCITY_FULL_SCALE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub time: f64,
    pub value: f64,
}

/// Bands of the pressure gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeBand {
    /// `[0, 50)`
    Low,
    /// `[50, 100]`
    High,
}

impl GaugeBand {
    pub const ALL: [GaugeBand; 2] = [GaugeBand::Low, GaugeBand::High];

    pub fn range(&self) -> (f64, f64) {
        match self {
            GaugeBand::Low => (0.0, 50.0),
            GaugeBand::High => (50.0, 100.0),
        }
    }

    /// Band containing `value`, if any. The low band is half open, the
    /// high band includes the top of the scale.
    pub fn of(value: f64) -> Option<GaugeBand> {
        if (0.0..50.0).contains(&value) {
            Some(GaugeBand::Low)
        } else if (50.0..=100.0).contains(&value) {
            Some(GaugeBand::High)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaugeSpec {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    /// Band the value falls in; `None` when off scale.
    pub band: Option<GaugeBand>,
}

impl GaugeSpec {
    pub fn pressure(value: f64) -> GaugeSpec {
        GaugeSpec {
            value,
            min: 0.0,
            max: 100.0,
            band: GaugeBand::of(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadialIndicator {
    pub value: f64,
    /// Filled fraction of the indicator, `min(|v|, 5) / 5`.
    pub proportion: f64,
    /// `|v|` to one decimal.
    pub label: String,
}

impl RadialIndicator {
    pub fn velocity(value: f64) -> RadialIndicator {
        let magnitude = value.abs();
        RadialIndicator {
            value,
            proportion: magnitude.min(VELOCITY_FULL_SCALE) / VELOCITY_FULL_SCALE,
            label: format!("{:.1}", magnitude),
        }
    }
}

/// How a sensor kind fared in the last refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindStatus {
    Fresh,
    Missing,
    Degraded(FieldError),
}

/// Display state for one refresh. Every field has a neutral default.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorView {
    pub temperature_series: Vec<SeriesPoint>,
    pub pressure_series: Vec<SeriesPoint>,
    pub temperature_latest: f64,
    pub pressure_gauge: Option<GaugeSpec>,
    pub velocity_indicator: Option<RadialIndicator>,
    pub light_latest: f64,
    pub accelerometer_latest: f64,
    pub yaw_text: String,
    pub pitch_text: String,
    pub roll_text: String,
    pub orientation: Orientation,
    pub mesh_transform: MeshTransform,
    pub status: BTreeMap<SensorKind, KindStatus>,
    /// Number of records the view was built from.
    pub records: usize,
}

impl Default for SensorView {
    fn default() -> Self {
        SensorView {
            temperature_series: Vec::new(),
            pressure_series: Vec::new(),
            temperature_latest: 0.0,
            pressure_gauge: None,
            velocity_indicator: None,
            light_latest: 0.0,
            accelerometer_latest: 0.0,
            yaw_text: String::new(),
            pitch_text: String::new(),
            roll_text: String::new(),
            orientation: Orientation::default(),
            mesh_transform: MeshTransform::identity(),
            status: SensorKind::ALL
                .iter()
                .map(|&kind| (kind, KindStatus::Missing))
                .collect(),
            records: 0,
        }
    }
}

impl SensorView {
    pub fn status(&self, kind: SensorKind) -> &KindStatus {
        self.status.get(&kind).unwrap_or(&KindStatus::Missing)
    }
}

/// Runs `derive` over the entries of one kind. Returns `None` when there
/// is nothing to show, recording why in `status`.
fn derive_kind<T, F>(
    snapshot: &Snapshot,
    kind: SensorKind,
    status: &mut BTreeMap<SensorKind, KindStatus>,
    derive: F,
) -> Option<T>
where
    F: FnOnce(&[&Entry]) -> Result<T, FieldError>,
{
    let rows: Vec<&Entry> = snapshot.of_kind(kind).collect();
    if rows.is_empty() {
        status.insert(kind, KindStatus::Missing);
        return None;
    }
    match derive(&rows) {
        Ok(value) => {
            status.insert(kind, KindStatus::Fresh);
            Some(value)
        }
        Err(e) => {
            log::warn!("error processing {} data: {}", kind, e);
            status.insert(kind, KindStatus::Degraded(e));
            None
        }
    }
}

fn series(rows: &[&Entry]) -> Result<Vec<SeriesPoint>, FieldError> {
    rows.iter()
        .map(|e| {
            Ok(SeriesPoint {
                time: parse_number("time", &e.record.time)?,
                value: parse_number("value", &e.record.value)?,
            })
        })
        .collect()
}

fn latest_value(rows: &[&Entry]) -> Result<f64, FieldError> {
    match rows.last() {
        Some(e) => parse_number("value", &e.record.value),
        None => Ok(0.0),
    }
}

/// Builds the view for one refresh. `prior` is the orientation from the
/// previous refresh; it is kept when no gyroscope data can be decoded.
pub fn build_view(snapshot: &Snapshot, prior: Orientation) -> SensorView {
    let mut view = SensorView {
        records: snapshot.len(),
        orientation: prior,
        ..SensorView::default()
    };
    let status = &mut view.status;

    if let Some(points) = derive_kind(snapshot, SensorKind::Temperature, status, series) {
        view.temperature_latest = points.last().map(|p| p.value).unwrap_or_default();
        view.temperature_series = points;
    }

    if let Some(points) = derive_kind(snapshot, SensorKind::Pressure, status, series) {
        view.pressure_gauge = points.last().map(|p| GaugeSpec::pressure(p.value));
        view.pressure_series = points;
    }

    view.velocity_indicator = derive_kind(snapshot, SensorKind::Velocity, status, latest_value)
        .map(RadialIndicator::velocity);

    view.light_latest =
        derive_kind(snapshot, SensorKind::Light, status, latest_value).unwrap_or_default();

    view.accelerometer_latest =
        derive_kind(snapshot, SensorKind::Accelerometer, status, latest_value)
            .unwrap_or_default();

    let attitude = derive_kind(snapshot, SensorKind::Gyroscope, status, |rows| {
        match rows.last() {
            Some(e) => decode_gyro(&e.record.value),
            None => Ok(Default::default()),
        }
    });
    if let Some(att) = attitude {
        view.yaw_text = format!("{:.2}", att.yaw);
        view.pitch_text = format!("{:.2}", att.pitch);
        view.roll_text = format!("{:.2}", att.roll);
        view.orientation = Orientation::from(att);
    }
    view.mesh_transform = MeshTransform::from_orientation(&view.orientation);

    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::SensorRecord;

    fn snapshot(rows: &[(&str, SensorKind, &str)]) -> Snapshot {
        rows.iter()
            .map(|(t, k, v)| SensorRecord::new(t, *k, v))
            .collect()
    }

    #[test]
    fn empty_snapshot_gives_defaults() {
        let prior = Orientation {
            angle_x: 4.0,
            angle_y: 5.0,
            angle_z: 6.0,
        };
        let view = build_view(&Snapshot::default(), prior);
        assert!(view.temperature_series.is_empty());
        assert_eq!(view.temperature_latest, 0.0);
        assert_eq!(view.pressure_gauge, None);
        assert_eq!(view.velocity_indicator, None);
        assert_eq!(view.yaw_text, "");
        assert_eq!(view.orientation, prior);
        assert_eq!(view.mesh_transform, MeshTransform::from_orientation(&prior));
        for kind in SensorKind::ALL {
            assert_eq!(view.status(kind), &KindStatus::Missing);
        }
    }

    #[test]
    fn missing_kinds_do_not_affect_present_ones() {
        let prior = Orientation {
            angle_x: 10.0,
            angle_y: 20.0,
            angle_z: 30.0,
        };
        let snap = snapshot(&[
            ("1", SensorKind::Temperature, "20.5"),
            ("1", SensorKind::Light, "300"),
            ("2", SensorKind::Temperature, "21.0"),
        ]);
        let view = build_view(&snap, prior);
        assert_eq!(
            view.temperature_series,
            vec![
                SeriesPoint {
                    time: 1.0,
                    value: 20.5
                },
                SeriesPoint {
                    time: 2.0,
                    value: 21.0
                },
            ]
        );
        assert_eq!(view.temperature_latest, 21.0);
        assert_eq!(view.light_latest, 300.0);

        assert!(view.pressure_series.is_empty());
        assert_eq!(view.pressure_gauge, None);
        assert_eq!(view.velocity_indicator, None);
        assert_eq!(view.accelerometer_latest, 0.0);
        assert_eq!(view.yaw_text, "");
        assert_eq!(view.orientation, prior);
        assert_eq!(view.status(SensorKind::Temperature), &KindStatus::Fresh);
        assert_eq!(view.status(SensorKind::Gyroscope), &KindStatus::Missing);
        assert_eq!(view.records, 3);
    }

    #[test]
    fn gyroscope_decoding_updates_orientation() {
        let snap = snapshot(&[
            ("1", SensorKind::Gyroscope, "9,9,9"),
            ("2", SensorKind::Gyroscope, "1.5,2.25,-3.0"),
        ]);
        let view = build_view(&snap, Orientation::default());
        assert_eq!(view.yaw_text, "1.50");
        assert_eq!(view.pitch_text, "2.25");
        assert_eq!(view.roll_text, "-3.00");
        assert_eq!(
            view.orientation,
            Orientation {
                angle_x: 1.5,
                angle_y: 2.25,
                angle_z: -3.0
            }
        );
    }

    #[test]
    fn bad_field_degrades_only_its_kind() {
        let prior = Orientation {
            angle_x: 1.0,
            angle_y: 2.0,
            angle_z: 3.0,
        };
        let snap = snapshot(&[
            ("1", SensorKind::Pressure, "40"),
            ("t2", SensorKind::Pressure, "41"),
            ("1", SensorKind::Gyroscope, "1,2"),
            ("1", SensorKind::Velocity, "fast"),
            ("1", SensorKind::Accelerometer, "9.81"),
        ]);
        let view = build_view(&snap, prior);
        assert!(view.pressure_series.is_empty());
        assert_eq!(view.pressure_gauge, None);
        assert!(matches!(
            view.status(SensorKind::Pressure),
            KindStatus::Degraded(FieldError::NotANumber { field: "time", .. })
        ));
        assert!(matches!(
            view.status(SensorKind::Gyroscope),
            KindStatus::Degraded(FieldError::Arity { parts: 2, .. })
        ));
        assert_eq!(view.orientation, prior);
        assert_eq!(view.yaw_text, "");
        assert_eq!(view.velocity_indicator, None);
        assert_eq!(view.accelerometer_latest, 9.81);
        assert_eq!(view.status(SensorKind::Accelerometer), &KindStatus::Fresh);
    }

    #[test]
    fn pressure_gauge_bands() {
        assert_eq!(GaugeSpec::pressure(30.0).band, Some(GaugeBand::Low));
        assert_eq!(GaugeSpec::pressure(75.0).band, Some(GaugeBand::High));
        assert_eq!(GaugeSpec::pressure(50.0).band, Some(GaugeBand::High));
        assert_eq!(GaugeSpec::pressure(100.0).band, Some(GaugeBand::High));
        assert_eq!(GaugeSpec::pressure(0.0).band, Some(GaugeBand::Low));
        assert_eq!(GaugeSpec::pressure(-1.0).band, None);
        assert_eq!(GaugeSpec::pressure(120.0).band, None);

        let snap = snapshot(&[("1", SensorKind::Pressure, "75")]);
        let gauge = build_view(&snap, Orientation::default()).pressure_gauge.unwrap();
        assert_eq!(gauge.value, 75.0);
        assert_eq!(gauge.band, Some(GaugeBand::High));
    }

    #[test]
    fn velocity_indicator_saturates() {
        let v = RadialIndicator::velocity(-2.5);
        assert_eq!(v.proportion, 0.5);
        assert_eq!(v.label, "2.5");
        assert_eq!(RadialIndicator::velocity(12.0).proportion, 1.0);

        let snap = snapshot(&[
            ("1", SensorKind::Velocity, "bogus"),
            ("2", SensorKind::Velocity, "1"),
        ]);
        let view = build_view(&snap, Orientation::default());
        assert_eq!(view.velocity_indicator.unwrap().proportion, 0.2);
    }
}
