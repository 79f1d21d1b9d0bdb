//! # EMS Core
//!
//! Edge energy-management runtime: loads the static site configuration,
//! starts one worker thread per hardware bridge and enters the tick loop.
//! Stops cleanly on SIGINT/SIGTERM at the next tick boundary.

use clap::Parser;
use ems_common::config::{EdgeConfig, LogLevel};
use ems_common::consts::DEFAULT_CONFIG_PATH;
use ems_core::components::ComponentFactory;
use ems_core::cycle::rt_setup;
use ems_core::runtime;
use ems_hal::BridgeRegistry;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// EMS Core: cycle-based energy-management runtime
#[derive(Parser, Debug)]
#[command(name = "ems_core")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Tick loop with process image and channel write arbitration")]
struct Args {
    /// Path to the site configuration TOML.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Validate the configuration, print the execution order and exit.
    #[arg(long)]
    check: bool,

    /// CPU core to pin the tick thread to (`rt` builds only).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (`rt` builds only).
    #[arg(long, default_value_t = 50)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    // Loaded before tracing so `shared.log_level` can set the default filter.
    let config = EdgeConfig::load_file(&args.config);
    setup_tracing(&args, config.as_ref().map(|c| c.shared.log_level).unwrap_or_default());

    info!("EMS Core v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("EMS Core shutdown complete");
}

fn run(args: &Args, config: EdgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Config OK: service '{}', target {}ms, {} channels, {} components, {} bridges",
        config.shared.service_name,
        config.cycle.target_ms,
        config.channels.len(),
        config.components.len(),
        config.bridges.len()
    );

    let drivers = BridgeRegistry::with_builtin_drivers();
    let factory = ComponentFactory::with_builtin_components();
    let mut worker = runtime::build(config, &drivers, &factory)?;

    if args.check {
        println!("{}", worker.registry().order().join("\n"));
        worker.shutdown();
        return Ok(());
    }

    rt_setup(args.cpu_core, args.rt_priority)?;

    // Setup signal handler for graceful shutdown.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    worker.run(&running);
    worker.shutdown();

    let stats = worker.stats();
    info!(
        "Ran {} ticks: min {}µs, avg {}µs, max {}µs, {} overruns, {} stale reads, {} bridge errors",
        stats.tick_count,
        if stats.tick_count == 0 { 0 } else { stats.min_tick_ns / 1000 },
        stats.avg_tick_ns() / 1000,
        stats.max_tick_ns / 1000,
        stats.overruns,
        stats.stale_reads,
        stats.bridge_errors
    );
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
///
/// `RUST_LOG` wins over the configured level; `--verbose` forces DEBUG.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(configured.as_directive()))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
