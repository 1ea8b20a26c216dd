//! # evfleet Server CLI
//!
//! Runs the central system that stations connect to.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use evfleet_server::{CsmsServer, ServerConfig};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "evfleet-server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the central system
    Start(StartArgs),
    /// Write a default configuration file
    Config(ConfigArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args)]
struct StartArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "server.toml")]
    config: PathBuf,

    /// Override WebSocket port
    #[arg(short, long)]
    port: Option<u16>,

    /// TLS certificate (PEM)
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// TLS private key (PKCS#8 PEM)
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

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
    #[arg(short, long, default_value = "server.toml")]
    output: PathBuf,
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
        Commands::Start(args) => start_command(args).await,
        Commands::Config(args) => config_command(args),
        Commands::Validate(args) => validate_command(args),
    }
}

async fn start_command(args: StartArgs) -> Result<()> {
    init_logging(&args.log_level, args.json_logs)?;

    let mut config = if args.config.exists() {
        info!("Loading configuration from: {}", args.config.display());
        ServerConfig::from_file(&args.config)?
    } else {
        warn!("Configuration file not found, using defaults");
        ServerConfig::default()
    };
    config.apply_env();

    if let Some(port) = args.port {
        config.ws_port = port;
    }
    if args.cert.is_some() {
        config.tls_cert = args.cert;
        config.tls_key = args.key;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    info!("Configuration:");
    info!("  Listen: {}:{}", config.bind_address, config.ws_port);
    info!("  TLS: {}", config.tls().is_some());
    info!("  Relay: {}", config.relay_base_url);

    let server = CsmsServer::bind(config).await?;
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping server...");
        }
        shutdown.cancel();
    });

    server.run(cancel).await?;
    Ok(())
}

fn config_command(args: ConfigArgs) -> Result<()> {
    let config = ServerConfig::default();
    std::fs::write(&args.output, toml::to_string_pretty(&config)?)?;
    println!("Configuration file generated: {}", args.output.display());
    Ok(())
}

fn validate_command(args: ValidateArgs) -> Result<()> {
    let config = ServerConfig::from_file(&args.config)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    println!("Configuration is valid");
    println!("  WebSocket port: {}", config.ws_port);
    println!("  Relay: {}", config.relay_base_url);
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
