//! # pulse-runner
//!
//! Entry point for every process of the pulse trading system.
//!
//! Loads the shared JSON configuration, constructs the module for the
//! requested process role, runs it until Ctrl+C, then stops it gracefully.
//! One OS process per role; all roles read the same config file:
//!
//! ```bash
//! pulse-runner config.json gateway
//! pulse-runner config.json mirror
//! pulse-runner config.json strategy
//! pulse-runner config.json router
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;

use pulse_core::config::AppConfig;
use pulse_core::module::Module;

/// Which process of the trading system to run.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    /// Broadcast market data and news to all connected readers.
    Gateway,
    /// Mirror the market-data feed into the shared price store.
    Mirror,
    /// Combine price and news signals into routed orders.
    Strategy,
    /// Accept order submissions and hand them to execution.
    Router,
}

/// Market data, signal fusion and order routing runner.
#[derive(Parser)]
#[command(name = "pulse-runner", about = "Pulse trading system runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Process role to run.
    #[arg(value_enum)]
    role: Role,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,
}

fn create_module(role: Role, config: &AppConfig) -> Box<dyn Module> {
    match role {
        Role::Gateway => Box::new(pulse_md::Gateway::new(config)),
        Role::Mirror => Box::new(pulse_md::PriceMirror::new(config)),
        Role::Strategy => Box::new(pulse_td::StrategyEngine::new(config)),
        Role::Router => Box::new(pulse_td::RouterModule::new(config)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let role_name = format!("{:?}", cli.role).to_lowercase();
    pulse_core::logging::init_logging(&cli.log_level, cli.log_dir.as_deref(), &role_name);

    info!("pulse-runner starting — role={role_name}, config={}", cli.config.display());

    let config = pulse_core::config::load_config(&cli.config)?;
    info!("config loaded — {} symbol(s), delimiter {:?}", config.symbols.len(), config.delimiter() as char);

    let mut module = create_module(cli.role, &config);
    module.start().await?;
    info!("module '{}' started — press Ctrl+C to stop", module.name());

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    module.stop().await?;
    info!("module '{}' stopped — goodbye", module.name());
    Ok(())
}
