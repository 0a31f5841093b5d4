use satdash::data::{GaugeBand, KindPersist, KindStatus, Orientation, Persister};
use satdash::link::port::StreamPort;
use satdash::pipeline::{self, IngestConfig, IngestExit, Ingestor};
use satdash::{Dashboard, SensorKind, SensorRecord, TelemetryStore};
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn frames(records: &[SensorRecord]) -> String {
    records.iter().map(|r| r.to_frame("panditas")).collect()
}

fn ingest(input: &str) -> TelemetryStore {
    let store = TelemetryStore::new();
    let report = Ingestor::new(
        StreamPort::new(input.as_bytes()),
        store.clone(),
        IngestConfig::default(),
    )
    .run_to_end();
    assert!(matches!(report.exit, IngestExit::LinkClosed(_)));
    store
}

#[test]
fn link_to_view() {
    let input = frames(&[
        SensorRecord::new("1", SensorKind::Temperature, "20.5"),
        SensorRecord::new("1", SensorKind::Pressure, "30"),
        SensorRecord::new("2", SensorKind::Pressure, "75"),
        SensorRecord::new("2", SensorKind::Velocity, "-2.5"),
        SensorRecord::new("3", SensorKind::Gyroscope, "1.5,2.25,-3.0"),
    ]);
    let store = ingest(&input);
    assert_eq!(store.len(), 5);

    let dir = tempfile::tempdir().unwrap();
    let dash = Dashboard::new(store, dir.path());
    let view = dash.refresh();

    assert_eq!(view.temperature_latest, 20.5);
    assert_eq!(view.pressure_series.len(), 2);
    assert_eq!(view.pressure_gauge.unwrap().band, Some(GaugeBand::High));
    assert_eq!(view.velocity_indicator.as_ref().unwrap().label, "2.5");
    assert_eq!(
        (&view.yaw_text[..], &view.pitch_text[..], &view.roll_text[..]),
        ("1.50", "2.25", "-3.00")
    );
    assert_eq!(
        dash.orientation(),
        Orientation {
            angle_x: 1.5,
            angle_y: 2.25,
            angle_z: -3.0
        }
    );
    assert_eq!(view.status(SensorKind::Light), &KindStatus::Missing);
    assert_eq!(view.light_latest, 0.0);
}

#[test]
fn noise_between_frames_is_skipped() {
    let mut input = String::from("garbage\n\n");
    input += &frames(&[SensorRecord::new("1", SensorKind::Light, "300")]);
    input += "panditas\n2\n";
    input += "panditas\n3\nlight\n301\n";
    let store = ingest(&input);
    let values: Vec<String> = store
        .snapshot()
        .iter()
        .map(|e| e.record.value.clone())
        .collect();
    // The truncated frame swallows the next handshake as its type line and
    // is rejected; reading resumes on the following lines.
    assert_eq!(values, vec!["300"]);
}

#[test]
fn values_are_stored_verbatim() {
    let store = ingest("panditas\n 7 \ngyroscope\n1.0, 2.0 ,3.0\n");
    let snap = store.snapshot();
    let entry = snap.iter().next().unwrap();
    assert_eq!(entry.record.time, " 7");
    assert_eq!(entry.record.value, "1.0, 2.0 ,3.0");
}

#[test]
fn save_is_incremental_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let r1 = SensorRecord::new("1", SensorKind::Accelerometer, "9.8");
    let r2 = SensorRecord::new("2", SensorKind::Accelerometer, "9.7");
    let r3 = SensorRecord::new("3", SensorKind::Accelerometer, "9.9");

    // First session writes r1 and r2.
    let first = ingest(&frames(&[r1.clone(), r2.clone()]));
    let report = Persister::new(dir.path()).persist(&first.snapshot());
    assert_eq!(report.rows_written(), 2);

    // A later session holds r1..r3 in memory and only appends r3.
    let second = ingest(&frames(&[r1, r2, r3]));
    let mut persister = Persister::new(dir.path());
    let report = persister.persist(&second.snapshot());
    assert!(matches!(
        report.outcomes[&SensorKind::Accelerometer],
        KindPersist::Appended(1)
    ));

    let path = persister.log_path(SensorKind::Accelerometer);
    let size = fs::metadata(&path).unwrap().len();
    let report = persister.persist(&second.snapshot());
    assert_eq!(report.rows_written(), 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), size);

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "time,sensor_type,value\n\
         1,accelerometer,9.8\n\
         2,accelerometer,9.7\n\
         3,accelerometer,9.9\n"
    );
}

#[test]
fn live_ingestion_with_concurrent_refresh() {
    let records: Vec<SensorRecord> = (0..200)
        .map(|i| SensorRecord::new(&i.to_string(), SensorKind::Temperature, &format!("{}.5", i)))
        .collect();
    let input = frames(&records);
    let store = TelemetryStore::new();
    let dir = tempfile::tempdir().unwrap();
    let dash = Arc::new(Dashboard::new(store.clone(), dir.path()));

    let handle = pipeline::spawn(
        StreamPort::new(std::io::Cursor::new(input.into_bytes())),
        store,
        IngestConfig::default(),
    )
    .unwrap();

    let reader = {
        let dash = dash.clone();
        thread::spawn(move || {
            let mut last = 0;
            for _ in 0..50 {
                let view = dash.refresh();
                // Series are always consistent with the record count.
                assert_eq!(view.temperature_series.len(), view.records);
                assert!(view.records >= last);
                last = view.records;
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let report = handle.join();
    reader.join().unwrap();
    assert_eq!(report.stats.records, 200);
    let view = dash.refresh();
    assert_eq!(view.temperature_series.len(), 200);
    assert_eq!(view.temperature_latest, 199.5);
}
