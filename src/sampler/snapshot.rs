/// One reading for a single accelerator device. Owned by exactly one
/// [`Snapshot`].
#[derive(Debug, Clone)]
pub struct AcceleratorReading {
    pub id: u32,
    pub name: String,
    pub load_percent: f64,
    pub memory_used_mb: f64,
    pub memory_total_mb: f64,
    pub memory_percent: f64,
    /// Degrees Celsius; 0 when the sensor is unreadable.
    pub temperature_c: f64,
}

/// One point-in-time measurement of CPU, memory and accelerator state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Unix seconds at sample time.
    pub timestamp: f64,
    /// Seconds since the session's first sample; non-decreasing within a
    /// session.
    pub elapsed_seconds: f64,
    /// ISO-8601 rendering of `timestamp` in local time.
    pub datetime: String,
    pub cpu_percent: f32,
    pub cpu_count: usize,
    /// Current frequency in MHz; 0 when the platform cannot report it.
    pub cpu_freq_mhz: f64,
    pub ram_total_gb: f64,
    pub ram_used_gb: f64,
    pub ram_available_gb: f64,
    pub ram_percent: f64,
    /// Per-device readings in index order; empty when no accelerator is
    /// available.
    pub accelerators: Vec<AcceleratorReading>,
}
