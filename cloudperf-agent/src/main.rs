//! cloudperf agent binary

use anyhow::{Context, Result};
use clap::Parser;
use cloudperf_agent::Agent;
use cloudperf_config::{AgentConfig, ConfigLoader, LogLevel};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Run a single test cycle and exit
    #[arg(long)]
    once: bool,

    /// Print a sample configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", AgentConfig::generate_sample());
        return Ok(());
    }

    let mut config = ConfigLoader::new()
        .load(cli.config.as_ref())
        .context("Failed to load configuration")?;

    if let Some(level) = &cli.log_level {
        config.logging.level = LogLevel::from_str(level).map_err(anyhow::Error::msg)?;
    }

    cloudperf_logging::init_logging(&config.logging)?;

    Agent::new(config).start(cli.once).await?;
    Ok(())
}
