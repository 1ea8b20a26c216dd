//! # evfleet Backend CLI
//!
//! Runs the relay sink, command channel and liveness monitor.

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use evfleet_backend::{open_store, router, AppState, BackendConfig, LivenessMonitor, StorageKind};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "evfleet-backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the backend
    Start(StartArgs),
    /// Write a default configuration file
    Config(ConfigArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum StorageArg {
    Memory,
    Sqlite,
}

#[derive(Args)]
struct StartArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "backend.toml")]
    config: PathBuf,

    /// Override listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override storage backend
    #[arg(long, value_enum)]
    storage: Option<StorageArg>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

#[derive(Args)]
struct ConfigArgs {
    /// Output file path
    #[arg(short, long, default_value = "backend.toml")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => start_command(args).await,
        Commands::Config(args) => config_command(args),
    }
}

async fn start_command(args: StartArgs) -> Result<()> {
    init_logging(&args.log_level, args.json_logs)?;

    let mut config = if args.config.exists() {
        info!("Loading configuration from: {}", args.config.display());
        BackendConfig::from_file(&args.config)?
    } else {
        warn!("Configuration file not found, using defaults");
        BackendConfig::default()
    };
    config.apply_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(storage) = args.storage {
        config.storage = match storage {
            StorageArg::Memory => StorageKind::Memory,
            StorageArg::Sqlite => StorageKind::Sqlite,
        };
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    let store = open_store(&config).await?;
    let state = AppState::new(store.clone());
    let monitor = LivenessMonitor::new(store, config.monitor_period(), config.staleness());

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    let monitor_cancel = cancel.clone();
    tracker.spawn(async move { monitor.run(monitor_cancel).await });

    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    info!("Backend listening on {}", listener.local_addr()?);

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping backend...");
        }
        shutdown.cancel();
    });

    let server_cancel = cancel.clone();
    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await
    {
        error!("HTTP server error: {}", e);
    }

    cancel.cancel();
    tracker.close();
    tracker.wait().await;
    info!("Backend stopped");
    Ok(())
}

fn config_command(args: ConfigArgs) -> Result<()> {
    let config = BackendConfig::default();
    std::fs::write(&args.output, toml::to_string_pretty(&config)?)?;
    println!("Configuration file generated: {}", args.output.display());
    Ok(())
}

fn init_logging(level: &str, json_logs: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    Ok(())
}
