use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between samples in the polling loop.
    pub interval_secs: f64,
    /// Directory for exported CSV/JSON files.
    pub output_dir: PathBuf,
    /// CPU usage measurement window in milliseconds.
    pub cpu_window_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            interval_secs: 1.0,
            output_dir: PathBuf::from("output/monitoring"),
            cpu_window_ms: 100,
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("resmon").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}
