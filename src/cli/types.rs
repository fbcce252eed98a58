//! CLI type definitions

use clap::{Parser, Subcommand};

use super::commands::baseline::BaselineArgs;
use super::commands::evaluation::EvaluationArgs;
use super::commands::init::InitArgs;
use super::commands::run::RunArgs;

/// Command line interface.
#[derive(Parser, Debug)]
#[command(name = "chatcheck")]
#[command(about = "Chatcheck - chatbot regression judging", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the project directory, default config and database
    Init(InitArgs),

    /// Inspect or stop runs
    Run(RunArgs),

    /// Submit and judge evaluations
    Evaluation(EvaluationArgs),

    /// Resolve baseline transcripts
    Baseline(BaselineArgs),
}
