//! bufmon-gen entry point
//!
//! Generates the buffer monitoring counter catalog for an ASIC family.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sonic_bufmon_catalog::{generate_for_profile, write_catalog, AsicProfile, CATALOG_FILE_NAME};

/// Buffer monitoring counter catalog generator
#[derive(Parser, Debug)]
#[command(name = "bufmon-gen")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ASIC family (e.g. trident)
    asic: String,

    /// Number of front panel ports
    ports: u32,

    /// Output file
    #[arg(short = 'o', long, default_value = CATALOG_FILE_NAME)]
    output: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> anyhow::Result<()> {
    let profile = AsicProfile::resolve(&args.asic, args.ports)?;
    let catalog = generate_for_profile(&profile);
    write_catalog(&args.output, &catalog, &profile)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("Generating catalog for {} with {} ports", args.asic, args.ports);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("bufmon-gen failed: {}", e);
            let families: Vec<_> = AsicProfile::supported_families().collect();
            error!("Supported ASIC families: {}", families.join(", "));
            ExitCode::FAILURE
        }
    }
}
