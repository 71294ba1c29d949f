//! Keymaster CLI
//!
//! Command-line interface for the agent wallet funding monitor.

use clap::{Parser, Subcommand};
use keymaster::config::{LoggingConfig, DEFAULT_CONFIG_PATH};
use keymaster::metrics::{MetricsServer, Registry};
use keymaster::wallet::BankSigner;
use keymaster::{logging, report, Config, Monitor, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "keymaster")]
#[command(about = "Keeps multi-chain agent wallets funded")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config_path: PathBuf,

    /// Enable debug logging and print the loaded configuration
    #[arg(long, global = true, overrides_with = "no_debug")]
    debug: bool,

    /// Disable debug logging
    #[arg(long, global = true, overrides_with = "debug")]
    no_debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured accounts forever, top them up and report metrics
    Monitor {
        /// Port to bind the metrics server to
        #[arg(long, default_value_t = 9090)]
        metrics_port: u16,

        /// Seconds to sleep between sweeps
        #[arg(long, default_value_t = 30)]
        pause_duration: u64,
    },

    /// Print the address of a hex-encoded private key
    HexKey {
        /// Private key, with or without 0x
        hex_key: String,
    },

    /// Run one read-only sweep and print what each network's bank would pay
    Report,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Commands::HexKey { hex_key } = &cli.command {
        logging::init(&LoggingConfig::default(), cli.debug);
        let signer = BankSigner::from_hex(hex_key)?;
        tracing::info!(address = %signer.address(), "Derived address");
        println!("Address: {}", signer.address());
        return Ok(());
    }

    let config = match Config::load(&cli.config_path) {
        Ok(config) => config,
        Err(e) => {
            logging::init(&LoggingConfig::default(), cli.debug);
            tracing::error!(
                error = %e,
                "Failed to load config from {}, check the file and try again.",
                cli.config_path.display()
            );
            std::process::exit(1);
        }
    };

    logging::init(&config.logging, cli.debug);

    if cli.debug {
        tracing::debug!(path = %cli.config_path.display(), "Loaded config");
        println!("{}", config.redacted_json()?);
    }

    match cli.command {
        Commands::Monitor {
            metrics_port,
            pause_duration,
        } => run_monitor(config, metrics_port, pause_duration).await,
        Commands::Report => run_report(config).await,
        Commands::HexKey { .. } => Ok(()),
    }
}

async fn run_monitor(config: Config, metrics_port: u16, pause_duration: u64) -> Result<()> {
    tracing::info!(
        environment = %config.environment,
        networks = config.networks.len(),
        homes = config.homes.len(),
        "Starting keymaster"
    );

    let registry = Arc::new(Registry::new(config.environment.as_str()));
    MetricsServer::new(registry.clone(), metrics_port).spawn()?;

    let monitor = Monitor::connect(&config, registry)?;
    monitor
        .run_forever(Duration::from_secs(pause_duration))
        .await;

    Ok(())
}

async fn run_report(config: Config) -> Result<()> {
    let registry = Arc::new(Registry::new(config.environment.as_str()));
    let monitor = Monitor::connect(&config, registry)?;

    let sweep = monitor.collect().await;
    for network in report::by_network(&sweep) {
        println!("{}", network);
    }

    if !sweep.skipped_homes.is_empty() {
        println!("Unreachable homes: {}", sweep.skipped_homes.join(", "));
    }
    if sweep.failed_evaluations > 0 {
        println!(
            "{} account(s) could not be evaluated, see the log for details",
            sweep.failed_evaluations
        );
    }

    Ok(())
}
