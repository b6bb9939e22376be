use std::fs::File;
use std::path::PathBuf;

use color_eyre::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::sampler::accel::DeviceIdent;
use crate::sampler::snapshot::Snapshot;
use crate::session::Session;

/// Outcome of a data export. `Empty` is the "nothing to save" signal,
/// distinct from an I/O error.
#[derive(Debug)]
pub enum ExportOutcome {
    Saved(PathBuf),
    Empty,
}

impl ExportOutcome {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ExportOutcome::Saved(path) => Some(path),
            ExportOutcome::Empty => None,
        }
    }
}

const SCALAR_COLUMNS: [&str; 10] = [
    "timestamp",
    "elapsed_seconds",
    "datetime",
    "cpu_percent",
    "cpu_count",
    "cpu_freq_mhz",
    "ram_total_gb",
    "ram_used_gb",
    "ram_available_gb",
    "ram_percent",
];

const ACCEL_FIELDS: [&str; 7] = [
    "id",
    "name",
    "load",
    "memory_used_mb",
    "memory_total_mb",
    "memory_percent",
    "temperature",
];

/// Deterministic column list for a session whose snapshots carry up to
/// `device_count` accelerator readings: the scalar columns in declaration
/// order, then `accel_<i>_<field>` per device slot.
pub fn csv_schema(device_count: usize) -> Vec<String> {
    let mut columns: Vec<String> = SCALAR_COLUMNS.iter().map(|c| (*c).to_string()).collect();
    for i in 0..device_count {
        for field in ACCEL_FIELDS {
            columns.push(format!("accel_{i}_{field}"));
        }
    }
    columns
}

fn max_device_count(snapshots: &[Snapshot]) -> usize {
    snapshots
        .iter()
        .map(|s| s.accelerators.len())
        .max()
        .unwrap_or(0)
}

fn csv_row(snapshot: &Snapshot, device_count: usize) -> Vec<String> {
    let mut row = vec![
        snapshot.timestamp.to_string(),
        snapshot.elapsed_seconds.to_string(),
        snapshot.datetime.clone(),
        snapshot.cpu_percent.to_string(),
        snapshot.cpu_count.to_string(),
        snapshot.cpu_freq_mhz.to_string(),
        snapshot.ram_total_gb.to_string(),
        snapshot.ram_used_gb.to_string(),
        snapshot.ram_available_gb.to_string(),
        snapshot.ram_percent.to_string(),
    ];
    for i in 0..device_count {
        match snapshot.accelerators.get(i) {
            Some(accel) => {
                row.push(accel.id.to_string());
                row.push(accel.name.clone());
                row.push(accel.load_percent.to_string());
                row.push(accel.memory_used_mb.to_string());
                row.push(accel.memory_total_mb.to_string());
                row.push(accel.memory_percent.to_string());
                row.push(accel.temperature_c.to_string());
            }
            // Device slot absent in this snapshot: empty cells.
            None => row.extend(std::iter::repeat_n(String::new(), ACCEL_FIELDS.len())),
        }
    }
    row
}

/// Writes all accumulated snapshots as CSV rows, one per snapshot in
/// collection order. Default filename is `monitoring_<session_id>.csv`.
pub fn save_data(session: &Session, filename: Option<&str>) -> Result<ExportOutcome> {
    let snapshots = session.snapshots();
    if snapshots.is_empty() {
        warn!("no monitoring data to save");
        return Ok(ExportOutcome::Empty);
    }

    let filename = match filename {
        Some(name) => name.to_string(),
        None => format!("monitoring_{}.csv", session.session_id()),
    };
    let path = session.output_dir().join(filename);

    let device_count = max_device_count(snapshots);
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(csv_schema(device_count))?;
    for snapshot in snapshots {
        writer.write_record(csv_row(snapshot, device_count))?;
    }
    writer.flush()?;

    info!(path = %path.display(), samples = snapshots.len(), "monitoring data saved");
    Ok(ExportOutcome::Saved(path))
}

#[derive(Debug, Serialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub start_time: Option<f64>,
    pub sample_count: usize,
    pub cpu_count: usize,
    pub total_ram_gb: f64,
    pub accelerator_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerators: Option<Vec<DeviceIdent>>,
}

/// Builds the metadata document for a session; valid with zero snapshots.
pub fn session_metadata(session: &mut Session) -> SessionMetadata {
    let accelerator_available = session.sampler().accelerator_available();
    let accelerators = accelerator_available.then(|| session.sampler().accelerator_devices());
    SessionMetadata {
        session_id: session.session_id().to_string(),
        start_time: session.start_unix_seconds(),
        sample_count: session.snapshots().len(),
        cpu_count: session.sampler().cpu_count(),
        total_ram_gb: session.sampler_mut().total_memory_gb(),
        accelerator_available,
        accelerators,
    }
}

/// Writes the session metadata document as pretty JSON. Default filename is
/// `monitoring_<session_id>_metadata.json`.
pub fn save_metadata(session: &mut Session, filename: Option<&str>) -> Result<PathBuf> {
    let filename = match filename {
        Some(name) => name.to_string(),
        None => format!("monitoring_{}_metadata.json", session.session_id()),
    };
    let path = session.output_dir().join(filename);

    let metadata = session_metadata(session);
    let file = File::create(&path)?;
    serde_json::to_writer_pretty(file, &metadata)?;

    info!(path = %path.display(), "metadata saved");
    Ok(path)
}
