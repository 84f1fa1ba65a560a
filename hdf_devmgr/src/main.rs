//! # HDF Device Manager Binary
//!
//! Hosts the device service registry and the device manager service,
//! publishes both under their well-known names and serves until shutdown.
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults
//! hdf_devmgr
//!
//! # Run with a config file and verbose logging
//! hdf_devmgr --config /etc/hdf/devmgr.toml -v
//!
//! # JSON logs for log shippers
//! hdf_devmgr --json
//! ```

#![deny(warnings)]

use clap::Parser;
use hdf_common::config::{ConfigError, ConfigLoader, CoreConfig};
use hdf_devmgr::DeviceContext;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// HDF Device Manager - device service registry and host router
#[derive(Parser, Debug)]
#[command(name = "hdf_devmgr")]
#[command(version)]
#[command(about = "HDF device manager: service registry and device host router")]
#[command(long_about = None)]
struct Args {
    /// Path to the configuration file (TOML)
    #[arg(short, long, default_value = "/etc/hdf/devmgr.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("device manager startup failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("HDF device manager v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    config.validate()?;

    let context = DeviceContext::new(&config);

    let running = Arc::new(AtomicBool::new(true));
    let running_flag = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running_flag.store(false, Ordering::SeqCst);
    })?;

    context.start_service()?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    context.shutdown();
    info!("HDF device manager shutdown complete");
    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &std::path::Path) -> Result<CoreConfig, ConfigError> {
    match CoreConfig::load(path) {
        Ok(config) => {
            info!("Loaded config from {:?}", path);
            Ok(config)
        }
        Err(ConfigError::FileNotFound) => {
            warn!("No config at {:?}, using defaults", path);
            Ok(CoreConfig::default())
        }
        Err(e) => Err(e),
    }
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
