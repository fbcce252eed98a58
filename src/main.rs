//! Chatcheck CLI entry point.

use anyhow::Result;
use clap::Parser;

use chatcheck::cli::commands::{baseline, evaluation, init, run};
use chatcheck::cli::{handle_error, Cli, Commands};
use chatcheck::infrastructure::config::ConfigLoader;
use chatcheck::infrastructure::logging::{cleanup_old_logs, LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = dispatch(cli).await {
        handle_error(err, json);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    if let Commands::Init(args) = cli.command {
        return init::execute(args, cli.json).await;
    }

    let config = ConfigLoader::load()?;
    let log_config = LogConfig::from(&config.logging);
    let _logger = LoggerImpl::init(&log_config)?;
    if let Some(log_dir) = &log_config.log_dir {
        if let Err(e) = cleanup_old_logs(log_dir, log_config.retention_days).await {
            tracing::warn!(error = %e, "Log retention cleanup failed");
        }
    }

    match cli.command {
        Commands::Init(_) => Ok(()),
        Commands::Run(args) => run::execute(args, &config, cli.json).await,
        Commands::Evaluation(args) => evaluation::execute(args, &config, cli.json).await,
        Commands::Baseline(args) => baseline::execute(args, &config, cli.json).await,
    }
}
