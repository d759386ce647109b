//! Yield Monitor CLI
//!
//! Live scan simulation, bulk loading, audit and export for the yield event log.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use yield_monitor::{
    config::Config,
    simulator::{RandSampler, ScanSampler, Simulator},
    store::EventLog,
    Record, YieldService, VERSION,
};

#[derive(Parser)]
#[command(name = "yield-monitor")]
#[command(version = VERSION)]
#[command(about = "Manufacturing yield event log with windowed trends", long_about = None)]
struct Cli {
    /// Event log database file (overrides the configured path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append one synthetic scan per tick until Ctrl+C
    Simulate {
        /// Delay between scans in milliseconds
        #[arg(long)]
        cadence_ms: Option<u64>,

        /// Seed for reproducible scans
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Reset the log and bulk load fresh scans
    Init {
        /// Number of scans to load
        #[arg(long)]
        records: Option<usize>,

        /// Seed for reproducible scans
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show total scans, global yield and the latest scans
    Audit {
        /// Number of recent scans to show
        #[arg(long, default_value = "5")]
        last: usize,
    },

    /// Print the windowed yield trend
    Trend {
        /// Records per window
        #[arg(long)]
        window_size: Option<usize>,

        /// Only use the most recent N records
        #[arg(long)]
        recent: Option<usize>,

        /// Omit the average temperature column
        #[arg(long)]
        no_temp: bool,
    },

    /// Export the full history as CSV
    Export {
        /// Output directory for the report
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Remove every record from the log
    Reset,

    /// Serve the dashboard API
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Run the live simulator alongside the server
        #[arg(long)]
        simulate: bool,

        /// Seed for reproducible scans
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show configuration
    Config,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    match cli.command {
        Commands::Simulate { cadence_ms, seed } => cmd_simulate(&config, cadence_ms, seed),
        Commands::Init { records, seed } => cmd_init(&config, records, seed),
        Commands::Audit { last } => cmd_audit(&config, last),
        Commands::Trend {
            window_size,
            recent,
            no_temp,
        } => cmd_trend(&config, window_size, recent, no_temp),
        Commands::Export { output } => cmd_export(&config, output),
        Commands::Reset => cmd_reset(&config),
        #[cfg(feature = "server")]
        Commands::Serve {
            port,
            simulate,
            seed,
        } => cmd_serve(&config, port, simulate, seed),
        Commands::Config => cmd_config(&config),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn sampler(seed: Option<u64>) -> Box<dyn ScanSampler> {
    match seed {
        Some(seed) => Box::new(RandSampler::seeded(seed)),
        None => Box::new(RandSampler::from_entropy()),
    }
}

fn open_log(config: &Config) -> anyhow::Result<Arc<EventLog>> {
    let log = EventLog::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open event log at {}",
            config.database_path.display()
        )
    })?;
    Ok(Arc::new(log))
}

fn open_service(config: &Config, seed: Option<u64>) -> anyhow::Result<YieldService> {
    let log = open_log(config)?;
    Ok(YieldService::new(
        log,
        config.simulator.model.clone(),
        config.trend.clone(),
        sampler(seed),
    ))
}

fn format_scan(record: &Record) -> String {
    let reading = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
    let time = record.timestamp.as_ref().map_or_else(
        || "-".to_string(),
        |ts| ts.clock_label().unwrap_or_else(|| ts.to_string()),
    );
    format!(
        "#{:<6} {:<4} | Temp: {}°C | Pressure: {} psi | Time: {}",
        record.id,
        record.status,
        reading(record.temp_c),
        reading(record.pressure_psi),
        time
    )
}

fn cmd_simulate(config: &Config, cadence_ms: Option<u64>, seed: Option<u64>) -> anyhow::Result<()> {
    let log = open_log(config)?;

    let mut sim_config = config.simulator.clone();
    if let Some(ms) = cadence_ms {
        anyhow::ensure!(ms > 0, "--cadence-ms must be positive");
        sim_config.cadence = Duration::from_millis(ms);
    }

    println!("Yield Monitor v{VERSION}");
    println!();
    println!("Live simulation started");
    println!("  Database: {}", config.database_path.display());
    println!("  Cadence: {}ms", sim_config.cadence.as_millis());
    println!(
        "  Fail threshold: {}°C, random fail rate: {:.1}%",
        sim_config.model.fail_threshold_c,
        sim_config.model.random_fail_rate * 100.0
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running))?;

    let mut simulator = Simulator::new(sim_config, Arc::clone(&log));
    simulator.start(sampler(seed))?;
    let receiver = simulator.receiver().clone();

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(record) => {
                let total = log
                    .count()
                    .map_or_else(|_| "?".to_string(), |n| n.to_string());
                println!("Scanned {} | Total Wafers: {}", format_scan(&record), total);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                tracing::error!("Simulator disconnected unexpectedly");
                break;
            }
        }
    }

    println!();
    println!("Stopping simulation...");
    simulator.stop();

    println!();
    println!("{}", simulator.stats().summary());
    Ok(())
}

fn cmd_init(config: &Config, records: Option<usize>, seed: Option<u64>) -> anyhow::Result<()> {
    let service = open_service(config, seed)?;
    let n = records.unwrap_or(config.simulator.bulk_records);

    println!("Initializing factory with {n} wafers...");
    let loaded = service
        .initialize(n)
        .context("Failed to initialize event log")?;
    println!("Factory initialized with {} records.", loaded.len());
    Ok(())
}

fn cmd_audit(config: &Config, last: usize) -> anyhow::Result<()> {
    let service = open_service(config, None)?;
    let report = service.audit(last).context("Failed to run audit")?;

    if report.total_scanned == 0 {
        println!("Event log is empty.");
        return Ok(());
    }

    println!("Yield Audit Report");
    println!("==================");
    println!();
    println!("Total wafers scanned: {}", report.total_scanned);
    if let Some(pct) = report.global_yield_pct {
        println!("Current global yield: {pct:.2}%");
    }
    println!();
    println!("Last {} scans:", report.last_scans.len());
    for record in &report.last_scans {
        println!("  {}", format_scan(record));
    }
    Ok(())
}

fn cmd_trend(
    config: &Config,
    window_size: Option<usize>,
    recent: Option<usize>,
    no_temp: bool,
) -> anyhow::Result<()> {
    let mut trend_defaults = config.trend.clone();
    if no_temp {
        trend_defaults.include_avg_temp = false;
    }
    let service = YieldService::new(
        open_log(config)?,
        config.simulator.model.clone(),
        trend_defaults,
        sampler(None),
    );

    let stats = service
        .get_stats(window_size, recent)
        .context("Failed to compute trend")?;

    println!("PASS: {}  FAIL: {}", stats.counts.pass, stats.counts.fail);
    println!();

    if stats.trend.is_empty() {
        println!("No records to chart.");
        return Ok(());
    }

    println!("{:<10} {:>8} {:>9} {:>8}", "time", "yield%", "avg temp", "samples");
    for point in &stats.trend {
        let temp = point
            .avg_temp
            .map_or_else(|| "-".to_string(), |t| format!("{t:.1}"));
        println!(
            "{:<10} {:>8.1} {:>9} {:>8}",
            point.time_label, point.yield_pct, temp, point.samples
        );
    }
    Ok(())
}

fn cmd_export(config: &Config, output: Option<PathBuf>) -> anyhow::Result<()> {
    let service = open_service(config, None)?;
    let export_dir = output.unwrap_or_else(|| config.export_path.clone());

    let path = service
        .export_to_dir(&export_dir)
        .with_context(|| format!("Failed to export to {}", export_dir.display()))?;
    println!("Exported full history to {}", path.display());
    Ok(())
}

fn cmd_reset(config: &Config) -> anyhow::Result<()> {
    let service = open_service(config, None)?;
    service.reset_all().context("Failed to reset event log")?;
    println!("Database reset successful.");
    Ok(())
}

#[cfg(feature = "server")]
fn cmd_serve(
    config: &Config,
    port: Option<u16>,
    simulate: bool,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    use yield_monitor::server::{self, ServerConfig};

    let service = Arc::new(open_service(config, seed)?);
    let port = port.unwrap_or(config.server.port);

    let mut simulator = if simulate {
        let mut simulator = Simulator::new(config.simulator.clone(), Arc::clone(service.log()));
        simulator.start(sampler(seed.map(|s| s.wrapping_add(1))))?;
        Some(simulator)
    } else {
        None
    };

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async {
        let (addr, shutdown_tx) = server::run(ServerConfig::new(port), Arc::clone(&service)).await?;
        println!("Serving yield API on http://{addr}");
        if simulate {
            println!("Live simulation running");
        }
        println!("Press Ctrl+C to stop");

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        let _ = shutdown_tx.send(());
        anyhow::Ok(())
    })?;

    if let Some(ref mut simulator) = simulator {
        simulator.stop();
        println!();
        println!("{}", simulator.stats().summary());
    }
    Ok(())
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
