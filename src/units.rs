const KIB: f64 = 1024.0;

pub fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / (KIB * KIB * KIB)
}

pub fn bytes_to_mib(bytes: u64) -> f64 {
    bytes as f64 / (KIB * KIB)
}

/// Clamps a percentage to [0, 100]. NaN (e.g. 0/0 bookkeeping on some
/// platforms) maps to 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}
