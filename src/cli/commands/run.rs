//! `chatcheck run` commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::sync::Arc;
use uuid::Uuid;

use crate::cli::context::{AppContext, Collaborators};
use crate::cli::display::{colorize_status, detail_table, format_rate};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, RunLevel, RunRef, RunState};
use crate::services::EvaluationDispatcher;

/// Run commands.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run subcommand
    #[command(subcommand)]
    pub command: RunCommands,
}

/// Subcommands of `chatcheck run`.
#[derive(Subcommand, Debug)]
pub enum RunCommands {
    /// Show a run's status
    Show {
        /// variant-run, test-run or suite-run
        #[arg(value_parser = parse_run_level)]
        level: RunLevel,
        /// Run id
        id: Uuid,
    },
    /// Stop a test run or suite run
    Stop {
        /// test-run or suite-run
        #[arg(value_parser = parse_run_level)]
        level: RunLevel,
        /// Run id
        id: Uuid,
    },
}

fn parse_run_level(s: &str) -> Result<RunLevel, String> {
    RunLevel::from_str(s).ok_or_else(|| format!("unknown run level '{s}' (expected variant-run, test-run or suite-run)"))
}

/// Result of `run show`.
#[derive(Debug, serde::Serialize)]
pub struct RunStateOutput {
    /// Run level
    pub level: RunLevel,
    /// Run id
    pub id: Uuid,
    /// Status block
    #[serde(flatten)]
    pub state: RunState,
}

impl CommandOutput for RunStateOutput {
    fn to_human(&self) -> String {
        let status = self.state.status.to_string();
        let table = detail_table([
            ("run", format!("{} {}", self.level, self.id)),
            ("status", colorize_status(&status).to_string()),
            ("info", self.state.status_info.clone().unwrap_or_default()),
            ("pass rate", format_rate(self.state.pass_rate)),
            (
                "avg elapsed",
                self.state
                    .average_elapsed_seconds
                    .map_or_else(|| "-".to_string(), |s| format!("{s:.2}s")),
            ),
            (
                "completed",
                self.state.completed_at.map_or_else(|| "-".to_string(), |at| at.to_rfc3339()),
            ),
        ]);
        table.to_string()
    }
}

/// Result of `run stop`.
#[derive(Debug, serde::Serialize)]
pub struct StopOutput {
    /// Run the stop was requested for
    pub run: RunRef,
    /// False when the run had already settled
    pub stopped: bool,
    /// Test runs stopped with a suite run
    pub cascaded: Vec<Uuid>,
}

impl CommandOutput for StopOutput {
    fn to_human(&self) -> String {
        if !self.stopped {
            return format!("{} was already complete.", self.run);
        }
        let mut message = format!("Stopped {}.", self.run);
        if !self.cascaded.is_empty() {
            message.push_str(&format!(" Also stopped {} running test run(s).", self.cascaded.len()));
        }
        message
    }
}

/// Dispatcher for commands that never submit evaluations.
struct NoDispatch;

#[async_trait::async_trait]
impl EvaluationDispatcher for NoDispatch {
    async fn dispatch(&self, evaluation_id: Uuid) -> crate::domain::errors::DomainResult<()> {
        tracing::debug!(evaluation_id = %evaluation_id, "Ignoring dispatch outside evaluation submit");
        Ok(())
    }
}

/// Run a run subcommand.
pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let context = AppContext::open(config).await?;
    // A stop can only settle a suite run as Stopped or Error, which never
    // needs a failure summary.
    let service = context.run_service(Collaborators::scripted().summarizer, Arc::new(NoDispatch));

    match args.command {
        RunCommands::Show { level, id } => {
            let run = RunRef::new(level, id);
            let state = service.get_run_state(run).await?;
            output(&RunStateOutput { level, id, state }, json_mode)?;
        }
        RunCommands::Stop { level, id } => {
            let report = service.stop_run(RunRef::new(level, id)).await?;
            output(
                &StopOutput {
                    run: report.run,
                    stopped: report.stopped,
                    cascaded: report.cascaded,
                },
                json_mode,
            )?;
        }
    }
    Ok(())
}
