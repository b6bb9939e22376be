use std::cell::Cell;
use std::path::Path;
use std::time::Duration;

use proptest::prelude::*;
use resmon::export::{self, ExportOutcome, csv_schema};
use resmon::sampler::Sampler;
use resmon::sampler::accel::{AcceleratorProbe, DeviceIdent, DisabledProbe, FixedProbe};
use resmon::sampler::snapshot::AcceleratorReading;
use resmon::session::Session;

fn reading(id: u32, load: f64) -> AcceleratorReading {
    AcceleratorReading {
        id,
        name: format!("TestAccel {id}"),
        load_percent: load,
        memory_used_mb: 2048.0,
        memory_total_mb: 8192.0,
        memory_percent: 25.0,
        temperature_c: 55.0,
    }
}

fn session_with_probe(dir: &Path, probe: Box<dyn AcceleratorProbe>) -> Session {
    let sampler = Sampler::with_probe(probe).with_cpu_window(Duration::from_millis(10));
    Session::new(sampler, dir).unwrap()
}

/// Returns a different canned poll on each read, to simulate device-count
/// changes across a session.
struct SequenceProbe {
    polls: Vec<Vec<AcceleratorReading>>,
    next: Cell<usize>,
}

impl SequenceProbe {
    fn new(polls: Vec<Vec<AcceleratorReading>>) -> Self {
        Self {
            polls,
            next: Cell::new(0),
        }
    }
}

impl AcceleratorProbe for SequenceProbe {
    fn available(&self) -> bool {
        true
    }

    fn devices(&self) -> Vec<DeviceIdent> {
        Vec::new()
    }

    fn poll(&self) -> color_eyre::Result<Vec<AcceleratorReading>> {
        let i = self.next.get();
        self.next.set(i + 1);
        Ok(self.polls.get(i).cloned().unwrap_or_default())
    }
}

#[test]
fn save_data_with_zero_snapshots_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_with_probe(dir.path(), Box::new(DisabledProbe));

    let outcome = export::save_data(&session, None).unwrap();
    assert!(matches!(outcome, ExportOutcome::Empty));
    assert!(outcome.path().is_none());

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(entries.is_empty(), "no file should have been created");
}

#[test]
fn csv_round_trip_preserves_rows_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let probe = FixedProbe::new(vec![reading(0, 42.5), reading(1, 7.0)]);
    let mut session = session_with_probe(dir.path(), Box::new(probe));

    for _ in 0..3 {
        session.sample();
    }
    let expected: Vec<_> = session.snapshots().to_vec();

    let outcome = export::save_data(&session, None).unwrap();
    let path = outcome.path().expect("data should have been saved").clone();
    assert_eq!(
        path.file_name().unwrap().to_string_lossy(),
        format!("monitoring_{}.csv", session.session_id())
    );

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    for column in [
        "elapsed_seconds",
        "cpu_percent",
        "ram_percent",
        "ram_used_gb",
        "accel_0_load",
        "accel_0_memory_percent",
        "accel_1_load",
    ] {
        assert!(
            headers.iter().any(|h| h == column),
            "missing column {column}"
        );
    }

    let elapsed_idx = headers.iter().position(|h| h == "elapsed_seconds").unwrap();
    let ram_idx = headers.iter().position(|h| h == "ram_percent").unwrap();
    let load_idx = headers.iter().position(|h| h == "accel_0_load").unwrap();
    let name_idx = headers.iter().position(|h| h == "accel_1_name").unwrap();

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), expected.len());
    for (row, snapshot) in rows.iter().zip(&expected) {
        let elapsed: f64 = row[elapsed_idx].parse().unwrap();
        let ram: f64 = row[ram_idx].parse().unwrap();
        let load: f64 = row[load_idx].parse().unwrap();
        assert!((elapsed - snapshot.elapsed_seconds).abs() < 1e-9);
        assert!((ram - snapshot.ram_percent).abs() < 1e-9);
        assert!((load - 42.5).abs() < 1e-9);
        assert_eq!(&row[name_idx], "TestAccel 1");
    }
}

#[test]
fn ragged_device_counts_pad_with_empty_cells() {
    let dir = tempfile::tempdir().unwrap();
    let probe = SequenceProbe::new(vec![
        vec![reading(0, 10.0)],
        vec![reading(0, 20.0), reading(1, 30.0)],
    ]);
    let mut session = session_with_probe(dir.path(), Box::new(probe));
    session.sample();
    session.sample();

    let outcome = export::save_data(&session, Some("ragged.csv")).unwrap();
    let path = outcome.path().unwrap().clone();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let load1_idx = headers.iter().position(|h| h == "accel_1_load").unwrap();

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][load1_idx], "");
    assert_eq!(&rows[1][load1_idx], "30");
}

#[test]
fn metadata_without_accelerators() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with_probe(dir.path(), Box::new(DisabledProbe));

    // No snapshots needed for metadata.
    let path = export::save_metadata(&mut session, None).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&contents).unwrap();

    assert_eq!(doc["session_id"], session.session_id());
    assert_eq!(doc["sample_count"], 0);
    assert!(doc["start_time"].is_null());
    assert_eq!(doc["accelerator_available"], false);
    assert!(doc.get("accelerators").is_none());
    assert!(doc["cpu_count"].as_u64().unwrap() > 0);
    assert!(doc["total_ram_gb"].as_f64().unwrap() > 0.0);
}

#[test]
fn metadata_lists_accelerator_devices() {
    let dir = tempfile::tempdir().unwrap();
    let probe = FixedProbe::new(vec![reading(0, 1.0), reading(1, 2.0)]);
    let mut session = session_with_probe(dir.path(), Box::new(probe));
    session.sample();

    let path = export::save_metadata(&mut session, Some("meta.json")).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&contents).unwrap();

    assert_eq!(doc["sample_count"], 1);
    assert!(doc["start_time"].as_f64().unwrap() > 0.0);
    assert_eq!(doc["accelerator_available"], true);
    let devices = doc["accelerators"].as_array().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["id"], 0);
    assert_eq!(devices[1]["name"], "TestAccel 1");
}

proptest! {
    #[test]
    fn schema_size_and_ordering(device_count in 0usize..16) {
        let schema = csv_schema(device_count);
        prop_assert_eq!(schema.len(), 10 + 7 * device_count);
        prop_assert_eq!(&schema[0], "timestamp");
        for i in 0..device_count {
            prop_assert_eq!(&schema[10 + 7 * i], &format!("accel_{i}_id"));
            prop_assert_eq!(&schema[10 + 7 * i + 6], &format!("accel_{i}_temperature"));
        }
    }
}
