use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use resmon::config::{Config, load_config, load_config_from_path};
use resmon::export::{self, ExportOutcome};
use resmon::sampler::Sampler;
use resmon::session::Session;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "resmon",
    about = "Resource sampler with CSV/JSON session export"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds between samples
    #[arg(long)]
    interval: Option<f64>,

    /// Total monitoring duration in seconds; runs until ctrl-c if omitted
    #[arg(long)]
    duration: Option<f64>,

    /// Take a single sample and export immediately
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Directory for exported files
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config_for_cli(&cli);

    if config.monitor.interval_secs <= 0.0 || !config.monitor.interval_secs.is_finite() {
        return Err(eyre!("--interval must be a positive number of seconds"));
    }
    if let Some(duration) = cli.duration
        && (duration <= 0.0 || !duration.is_finite())
    {
        return Err(eyre!("--duration must be a positive number of seconds"));
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed))?;
    }

    let sampler =
        Sampler::new().with_cpu_window(Duration::from_millis(config.monitor.cpu_window_ms));
    let mut session = Session::new(sampler, &config.monitor.output_dir)?;

    if cli.once {
        let snapshot = session.sample();
        println!(
            "cpu={:.1}% ram={:.1}% ({:.2}/{:.2} GiB)",
            snapshot.cpu_percent,
            snapshot.ram_percent,
            snapshot.ram_used_gb,
            snapshot.ram_total_gb
        );
    } else {
        let interval = Duration::from_secs_f64(config.monitor.interval_secs);
        let duration = cli.duration.map(Duration::from_secs_f64);
        session.run(interval, duration, &cancel);
    }

    match export::save_data(&session, None)? {
        ExportOutcome::Saved(path) => println!("data: {}", path.display()),
        ExportOutcome::Empty => println!("no samples collected, nothing saved"),
    }
    let metadata_path = export::save_metadata(&mut session, None)?;
    println!("metadata: {}", metadata_path.display());

    Ok(())
}

fn load_config_for_cli(cli: &Cli) -> Config {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(interval) = cli.interval {
        config.monitor.interval_secs = interval;
    }
    if let Some(ref dir) = cli.output_dir {
        config.monitor.output_dir = dir.clone();
    }

    config
}
