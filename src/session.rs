use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use color_eyre::Result;
use tracing::{debug, info, warn};

use crate::export;
use crate::sampler::Sampler;
use crate::sampler::snapshot::Snapshot;

/// Monotonic/wall-clock pair bound on a session's first sample.
#[derive(Clone, Copy)]
struct SessionStart {
    instant: Instant,
    unix_seconds: f64,
}

/// One monitoring run: an ordered buffer of snapshots sharing a start time
/// and identifier. Not internally synchronized; one session per thread.
pub struct Session {
    sampler: Sampler,
    snapshots: Vec<Snapshot>,
    start: Option<SessionStart>,
    session_id: String,
    output_dir: PathBuf,
}

fn mint_session_id() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn unix_now() -> f64 {
    chrono::Local::now().timestamp_micros() as f64 / 1e6
}

impl Session {
    /// Creates an empty session. The output directory is created with
    /// parents; a pre-existing directory is reused.
    pub fn new(sampler: Sampler, output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)?;
        let session_id = mint_session_id();
        info!(session_id, dir = %output_dir.display(), "session initialized");
        Ok(Self {
            sampler,
            snapshots: Vec::new(),
            start: None,
            session_id,
            output_dir,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Unix seconds of the first sample, if any sample has been taken.
    pub fn start_unix_seconds(&self) -> Option<f64> {
        self.start.map(|s| s.unix_seconds)
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn sampler_mut(&mut self) -> &mut Sampler {
        &mut self.sampler
    }

    /// Takes one sample and appends it. Binds the session start on the first
    /// call.
    pub fn sample(&mut self) -> &Snapshot {
        let start = *self.start.get_or_insert_with(|| SessionStart {
            instant: Instant::now(),
            unix_seconds: unix_now(),
        });
        let elapsed = start.instant.elapsed().as_secs_f64();
        let snapshot = self.sampler.snapshot(elapsed);
        self.snapshots.push(snapshot);
        &self.snapshots[self.snapshots.len() - 1]
    }

    /// Clears snapshots and start, mints a new session id. Safe at any point
    /// in the lifecycle.
    pub fn reset(&mut self) {
        self.snapshots.clear();
        self.start = None;
        self.session_id = mint_session_id();
        info!(session_id = %self.session_id, "session reset");
    }

    /// Cooperative polling loop: sample, sleep `interval`, repeat until
    /// cumulative elapsed time reaches `duration` (forever when `None`) or
    /// `cancel` is set. Interruption leaves collected snapshots intact.
    pub fn run(&mut self, interval: Duration, duration: Option<Duration>, cancel: &AtomicBool) {
        info!(
            interval_secs = interval.as_secs_f64(),
            duration_secs = duration.map(|d| d.as_secs_f64()),
            "monitoring started"
        );

        loop {
            if cancel.load(Ordering::Relaxed) {
                info!("monitoring interrupted");
                break;
            }

            let (cpu, ram, elapsed) = {
                let snapshot = self.sample();
                (
                    snapshot.cpu_percent,
                    snapshot.ram_percent,
                    snapshot.elapsed_seconds,
                )
            };
            debug!(
                cpu = format_args!("{cpu:.1}%"),
                ram = format_args!("{ram:.1}%"),
                elapsed = format_args!("{elapsed:.1}s"),
                "sample"
            );

            if let Some(limit) = duration
                && elapsed >= limit.as_secs_f64()
            {
                info!("monitoring duration reached");
                break;
            }

            if !sleep_unless_cancelled(interval, cancel) {
                info!("monitoring interrupted");
                break;
            }
        }
    }
}

/// Sleeps `total` in short slices, bailing out early when `cancel` flips.
/// Returns false when cancelled.
fn sleep_unless_cancelled(total: Duration, cancel: &AtomicBool) -> bool {
    const SLICE: Duration = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(SLICE));
    }
}

/// Keeps a wrapped-call name filesystem-safe before it is embedded in an
/// export filename. Path separators and other suspect characters become '_'
/// so the files cannot land outside the session's output directory.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Runs `f` with a snapshot before and after the call, then exports both the
/// data and metadata files named after `name`. The post-call sample and
/// export happen on every exit path, including an `Err` or a panic, and the
/// result of `f` is returned unchanged; export failures during cleanup are
/// logged, never substituted for it.
pub fn monitored<T, E, F>(name: &str, session: &mut Session, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    struct Finalize<'a> {
        name: String,
        session: &'a mut Session,
    }

    impl Drop for Finalize<'_> {
        fn drop(&mut self) {
            self.session.sample();
            let id = self.session.session_id().to_string();
            let data_name = format!("monitor_{}_{}.csv", self.name, id);
            let meta_name = format!("monitor_{}_{}_metadata.json", self.name, id);
            if let Err(err) = export::save_data(self.session, Some(&data_name)) {
                warn!(name = %self.name, "monitored data export failed: {err}");
            }
            if let Err(err) = export::save_metadata(self.session, Some(&meta_name)) {
                warn!(name = %self.name, "monitored metadata export failed: {err}");
            }
        }
    }

    info!(name, "monitored call started");
    session.sample();
    let guard = Finalize {
        name: sanitize_name(name),
        session,
    };
    let result = f();
    drop(guard);
    result
}
