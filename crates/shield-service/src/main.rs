use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shield_core::event_log::{Event, EventLevel, EventLog};
use shield_core::paths::{data_dir, CONFIG_FILE};
use shield_core::settings::MonitorSettings;
use shield_service::monitor::{spawn_monitor_loop, Monitor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Shield directory tamper monitor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Monitor the protected folder until interrupted
    Run {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Run a single scan cycle and print its report
    Scan {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Show level counts and the most recent events
    Events {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, data_dir } => run_command(config, data_dir).await,
        Commands::Scan { config, data_dir } => scan_command(config, data_dir),
        Commands::Events {
            config,
            data_dir,
            limit,
        } => events_command(config, data_dir, limit),
    }
}

fn load_settings(
    config_override: Option<PathBuf>,
    data_dir_override: Option<PathBuf>,
) -> Result<MonitorSettings> {
    let data = match data_dir_override {
        Some(dir) => dir,
        None => data_dir()?,
    };
    std::fs::create_dir_all(&data)
        .with_context(|| format!("failed to create data directory {}", data.display()))?;
    let config_path = config_override.unwrap_or_else(|| data.join(CONFIG_FILE));
    let mut settings = if config_path.exists() {
        MonitorSettings::load(&config_path)
            .with_context(|| format!("invalid config {}", config_path.display()))?
    } else {
        info!(path = %config_path.display(), "no config file, using defaults");
        MonitorSettings::default()
    };
    settings.resolve_paths(&data);
    Ok(settings)
}

fn open_event_log(settings: &MonitorSettings) -> Result<Arc<EventLog>> {
    let log = EventLog::new(&settings.event_log, settings.event_log_max_bytes)
        .with_context(|| format!("failed to open event log {}", settings.event_log.display()))?;
    Ok(Arc::new(log))
}

async fn run_command(config: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(config, data_dir)?;
    let event_log = open_event_log(&settings)?;
    let monitor = Monitor::new(&settings, event_log);

    monitor.emit(
        Event::info(
            "startup",
            format!(
                "Shield protection activated. Monitoring: {}",
                settings.protected_folder.display()
            ),
        )
        .with_details(serde_json::json!({
            "protected_folder": settings.protected_folder.display().to_string(),
            "interval_secs": settings.scan_interval_secs,
        })),
    );

    let (task, control) =
        spawn_monitor_loop(monitor, Duration::from_secs(settings.scan_interval_secs));

    info!("service started");
    signal::ctrl_c().await?;
    info!("service stopping");
    control.shutdown_tx.send(true)?;
    let monitor = task.await?;
    monitor.emit(Event::info("shutdown", "Shield protection stopped."));
    Ok(())
}

fn scan_command(config: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(config, data_dir)?;
    let event_log = open_event_log(&settings)?;
    let mut monitor = Monitor::new(&settings, event_log);
    let report = monitor.run_cycle()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn events_command(config: Option<PathBuf>, data_dir: Option<PathBuf>, limit: usize) -> Result<()> {
    let settings = load_settings(config, data_dir)?;
    let event_log = EventLog::new(&settings.event_log, settings.event_log_max_bytes)?;
    let events = event_log.read_recent(Some(limit))?;
    let count = |level: EventLevel| events.iter().filter(|e| e.level == level).count();
    println!(
        "events={} alerts={} warnings={} info={}",
        events.len(),
        count(EventLevel::Alert),
        count(EventLevel::Warning),
        count(EventLevel::Info)
    );
    for event in &events {
        println!(
            "{} {} {} {}",
            event.timestamp.to_rfc3339(),
            event.level,
            event.event_type,
            event.message
        );
    }
    Ok(())
}
