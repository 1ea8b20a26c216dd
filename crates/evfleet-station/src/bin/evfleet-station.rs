//! # evfleet Station CLI
//!
//! Runs a fleet of simulated charge points against a central system.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use evfleet_station::{Fleet, FleetConfig};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "evfleet-station")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the station fleet
    Run(RunArgs),
    /// Generate a default configuration file
    Config(ConfigArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "stations.toml")]
    config: PathBuf,

    /// Override central system URL
    #[arg(short = 'u', long, env = "EVFLEET_SERVER_URL")]
    server_url: Option<String>,

    /// Override station ids (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    ids: Option<Vec<String>>,

    /// Override command API base URL
    #[arg(long, env = "EVFLEET_COMMAND_API")]
    command_api: Option<String>,

    /// Verify the server's TLS certificate
    #[arg(long)]
    verify_tls: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

#[derive(Args)]
struct ConfigArgs {
    /// Output file path (.toml or .json)
    #[arg(short, long, default_value = "stations.toml")]
    output: PathBuf,

    /// Central system URL
    #[arg(short, long, default_value = "wss://localhost:8080")]
    url: String,

    /// Station ids (comma separated)
    #[arg(short, long, value_delimiter = ',', default_value = "EVC_1,EVC_2,EVC_3")]
    ids: Vec<String>,
}

#[derive(Args)]
struct ValidateArgs {
    /// Configuration file path
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_command(args).await,
        Commands::Config(args) => config_command(args),
        Commands::Validate(args) => validate_command(args),
    }
}

async fn run_command(args: RunArgs) -> Result<()> {
    init_logging(&args.log_level, args.json_logs)?;

    let mut config = if args.config.exists() {
        info!("Loading configuration from: {}", args.config.display());
        FleetConfig::from_file(&args.config)?
    } else {
        warn!("Configuration file not found, using defaults");
        FleetConfig::default()
    };

    if let Some(url) = args.server_url {
        config.station.server_url = url;
    }
    if let Some(ids) = args.ids {
        config.station_ids = ids;
    }
    if let Some(api) = args.command_api {
        config.station.command_api_url = api;
    }
    if args.verify_tls {
        config.station.tls = evfleet_transport::ClientTls::verified();
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    info!("Configuration:");
    info!("  Central System: {}", config.station.server_url);
    info!("  Stations: {}", config.station_ids.join(", "));
    info!("  Command API: {}", config.station.command_api_url);

    let fleet = Fleet::from_config(&config)?;
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
        }
        shutdown.cancel();
    });

    fleet.run(cancel).await;
    Ok(())
}

fn config_command(args: ConfigArgs) -> Result<()> {
    let mut config = FleetConfig::default();
    config.station.server_url = args.url;
    config.station_ids = args.ids;

    config.to_file(&args.output)?;

    println!("Configuration file generated: {}", args.output.display());
    println!("  server_url: {}", config.station.server_url);
    println!("  station_ids: {}", config.station_ids.join(", "));
    Ok(())
}

fn validate_command(args: ValidateArgs) -> Result<()> {
    let config = FleetConfig::from_file(&args.config)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    println!("Configuration is valid");
    println!("  Stations: {}", config.station_ids.len());
    println!("  Heartbeat Interval: {}s", config.station.heartbeat_interval_secs);
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
