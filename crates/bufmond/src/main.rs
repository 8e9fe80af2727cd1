//! bufmond daemon entry point.
//!
//! Loads the buffer monitoring counter catalog into the shared store once
//! the system is configured, then exits.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sonic_bufmond::config::DEFAULT_CONFIG_PATH;
use sonic_bufmond::{
    bufmon_schema, BufmondConfig, Daemon, DaemonExit, RedisStore, ShutdownSignal, UnixctlServer,
};

/// Buffer monitoring counter catalog daemon
#[derive(Parser, Debug)]
#[command(name = "bufmond")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Store endpoint (overrides the config file)
    #[arg(short = 'd', long = "database")]
    database: Option<String>,

    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Control socket path (overrides the config file)
    #[arg(long)]
    control_socket: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<BufmondConfig> {
    let mut config = BufmondConfig::load_or_default(&args.config)?;
    if let Some(endpoint) = &args.database {
        config.database.endpoint = endpoint.clone();
    }
    if let Some(path) = &args.control_socket {
        config.control.socket_path = path.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Triggers shutdown on SIGINT or SIGTERM
fn setup_signal_handlers(shutdown: Arc<ShutdownSignal>) {
    tokio::spawn(async move {
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = term.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received SIGINT");
                }
            }
        }
        shutdown.trigger();
    });
}

async fn run(config: BufmondConfig) -> anyhow::Result<DaemonExit> {
    let store = RedisStore::connect(
        &config.database.endpoint,
        bufmon_schema(),
        config.poll_interval(),
    )
    .await?;
    let control = UnixctlServer::bind(&config.control.socket_path)?;

    let mut daemon = Daemon::new(store, config.readiness_retry()).with_control(control);
    setup_signal_handlers(daemon.shutdown_handle());

    Ok(daemon.run().await?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("--- Starting bufmond ---");

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("bufmond configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(exit) => {
            info!("bufmond exiting: {:?}", exit);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("bufmond failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
