//! HIDS agent: host intrusion detection core.
//!
//! Ingests syscall events, maintains per-process behavioral state, and
//! raises alerts for high-risk syscall bursts, ML-flagged anomalies, and
//! network connection patterns consistent with C2 beaconing, port
//! scanning, or data exfiltration.

mod pipeline;
mod response;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use hids_core::config::{ConfigLoader, HidsConfig};

#[derive(Parser)]
#[command(name = "hids-agent")]
#[command(author)]
#[command(version)]
#[command(about = "Host-based intrusion detection agent", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "HIDS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent until interrupted
    Run,
    /// Validate configuration and exit
    Check,
    /// Print resolved configuration and collector availability
    Status,
}

fn init_tracing(verbose: u8, configured_level: &str) {
    let level = if verbose > 0 {
        match verbose {
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    } else {
        match configured_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli_path: Option<PathBuf>) -> anyhow::Result<HidsConfig> {
    ConfigLoader::new()
        .with_cli_path(cli_path)
        .load()
        .map_err(Into::into)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            let config = load_config(cli.config)?;
            init_tracing(cli.verbose, &config.agent.log_level);
            pipeline::run(config).await
        }
        Commands::Check => {
            let config = load_config(cli.config)?;
            init_tracing(cli.verbose, &config.agent.log_level);
            tracing::info!("configuration is valid");
            println!("configuration OK");
            Ok(())
        }
        Commands::Status => {
            let config = load_config(cli.config)?;
            init_tracing(cli.verbose, &config.agent.log_level);
            println!("collector: {:?}", config.collector.kind);
            println!("risk_threshold: {}", config.detection.risk_threshold);
            println!(
                "warmup_period_seconds: {}",
                config.detection.warmup_period_seconds
            );
            println!(
                "snapshot primary path: {}",
                config.snapshot.primary_path.display()
            );
            Ok(())
        }
    }
}
