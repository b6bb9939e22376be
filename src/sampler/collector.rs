use std::thread;
use std::time::Duration;

use sysinfo::{MINIMUM_CPU_UPDATE_INTERVAL, System};
use tracing::warn;

use super::accel::{AcceleratorProbe, DeviceIdent, default_probe};
use super::snapshot::{AcceleratorReading, Snapshot};
use crate::units::{bytes_to_gib, clamp_percent};

/// Blocking window between the two CPU refreshes that produce a usage
/// percentage. Dominates the cost of one sample; never below sysinfo's
/// minimum update interval, under which usage figures are unreliable.
fn default_cpu_window() -> Duration {
    MINIMUM_CPU_UPDATE_INTERVAL.max(Duration::from_millis(100))
}

pub struct CpuInfo {
    pub cpu_percent: f32,
    pub cpu_count: usize,
    pub cpu_freq_mhz: f64,
}

pub struct MemoryInfo {
    pub ram_total_gb: f64,
    pub ram_used_gb: f64,
    pub ram_available_gb: f64,
    pub ram_percent: f64,
}

/// Produces [`Snapshot`]s of current machine state. CPU and memory reads
/// never fail; accelerator reads degrade to empty per the probe's policy.
pub struct Sampler {
    sys: System,
    probe: Box<dyn AcceleratorProbe>,
    cpu_window: Duration,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler {
    pub fn new() -> Self {
        Self::with_probe(default_probe())
    }

    pub fn with_probe(probe: Box<dyn AcceleratorProbe>) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();
        Sampler {
            sys,
            probe,
            cpu_window: default_cpu_window(),
        }
    }

    /// Overrides the CPU measurement window. Windows below sysinfo's
    /// minimum update interval make the usage figure read low; tests trade
    /// that accuracy for sample latency.
    pub fn with_cpu_window(mut self, window: Duration) -> Self {
        self.cpu_window = window;
        self
    }

    pub fn cpu_window(&self) -> Duration {
        self.cpu_window
    }

    pub fn cpu_info(&mut self) -> CpuInfo {
        self.sys.refresh_cpu_all();
        thread::sleep(self.cpu_window);
        self.sys.refresh_cpu_all();

        let cpu_freq_mhz = self
            .sys
            .cpus()
            .first()
            .map(|cpu| cpu.frequency() as f64)
            .unwrap_or(0.0);

        CpuInfo {
            cpu_percent: self.sys.global_cpu_usage().max(0.0),
            cpu_count: self.sys.cpus().len(),
            cpu_freq_mhz,
        }
    }

    pub fn memory_info(&mut self) -> MemoryInfo {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        // used > total has been observed on some platforms' bookkeeping.
        let used = self.sys.used_memory().min(total);
        let available = self.sys.available_memory();
        let ram_percent = if total > 0 {
            clamp_percent(used as f64 / total as f64 * 100.0)
        } else {
            0.0
        };

        MemoryInfo {
            ram_total_gb: bytes_to_gib(total),
            ram_used_gb: bytes_to_gib(used),
            ram_available_gb: bytes_to_gib(available),
            ram_percent,
        }
    }

    /// All-or-nothing per poll: a failed accelerator poll degrades to no
    /// data rather than partial readings.
    pub fn accelerator_info(&self) -> Vec<AcceleratorReading> {
        self.probe.poll().unwrap_or_else(|err| {
            warn!("accelerator poll failed: {err}");
            Vec::new()
        })
    }

    pub fn accelerator_available(&self) -> bool {
        self.probe.available()
    }

    pub fn accelerator_devices(&self) -> Vec<DeviceIdent> {
        self.probe.devices()
    }

    pub fn cpu_count(&self) -> usize {
        self.sys.cpus().len()
    }

    pub fn total_memory_gb(&mut self) -> f64 {
        self.sys.refresh_memory();
        bytes_to_gib(self.sys.total_memory())
    }

    /// Composes one snapshot from the three reads. `elapsed_seconds` is the
    /// caller's session-relative offset.
    pub fn snapshot(&mut self, elapsed_seconds: f64) -> Snapshot {
        let now = chrono::Local::now();
        let cpu = self.cpu_info();
        let memory = self.memory_info();
        let accelerators = self.accelerator_info();

        Snapshot {
            timestamp: now.timestamp_micros() as f64 / 1e6,
            elapsed_seconds,
            datetime: now.to_rfc3339(),
            cpu_percent: cpu.cpu_percent,
            cpu_count: cpu.cpu_count,
            cpu_freq_mhz: cpu.cpu_freq_mhz,
            ram_total_gb: memory.ram_total_gb,
            ram_used_gb: memory.ram_used_gb,
            ram_available_gb: memory.ram_available_gb,
            ram_percent: memory.ram_percent,
            accelerators,
        }
    }
}
