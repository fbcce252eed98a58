//! `chatcheck evaluation` commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::cli::context::{AppContext, Collaborators};
use crate::cli::display::{colorize_status, detail_table};
use crate::cli::output::{output, CommandOutput};
use crate::domain::errors::DomainError;
use crate::domain::models::{Config, Evaluation, RunRef};
use crate::domain::ports::RunRepository;
use crate::services::{EvaluationDispatcher, JudgeQueue};

/// Evaluation commands.
#[derive(Args, Debug)]
pub struct EvaluationArgs {
    /// Evaluation subcommand
    #[command(subcommand)]
    pub command: EvaluationCommands,
}

/// Subcommands of `chatcheck evaluation`.
#[derive(Subcommand, Debug)]
pub enum EvaluationCommands {
    /// Record a replayed conversation and judge it in-process
    Submit {
        /// Variant run receiving the evaluation
        variant_run_id: Uuid,
        /// File holding the HTML capture of the replayed conversation
        #[arg(long)]
        html: PathBuf,
        /// Seconds the replay took
        #[arg(long)]
        elapsed: f64,
        /// Use the offline scripted collaborators instead of OpenAI
        #[arg(long)]
        scripted: bool,
    },
}

/// Result of `evaluation submit`.
#[derive(Debug, serde::Serialize)]
pub struct EvaluationOutput {
    /// Evaluation after judging
    #[serde(flatten)]
    pub evaluation: Evaluation,
    /// Variant run it belongs to
    pub variant_run: RunRef,
}

impl CommandOutput for EvaluationOutput {
    fn to_human(&self) -> String {
        let evaluation = &self.evaluation;
        let status = evaluation.status.to_string();
        detail_table([
            ("evaluation", evaluation.id.to_string()),
            ("variant run", evaluation.variant_run_id.to_string()),
            ("status", colorize_status(&status).to_string()),
            ("info", evaluation.status_info.clone().unwrap_or_default()),
            (
                "baseline",
                evaluation
                    .matched_baseline_id
                    .map_or_else(|| "-".to_string(), |id| id.to_string()),
            ),
            ("elapsed", format!("{:.2}s", evaluation.replayed_elapsed_seconds)),
        ])
        .to_string()
    }
}

/// Run an evaluation subcommand.
pub async fn execute(args: EvaluationArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        EvaluationCommands::Submit {
            variant_run_id,
            html,
            elapsed,
            scripted,
        } => {
            let html_capture = tokio::fs::read_to_string(&html)
                .await
                .with_context(|| format!("Failed to read {}", html.display()))?;

            let context = AppContext::open(config).await?;
            let collaborators = Collaborators::select(config, scripted)?;
            let queue = Arc::new(JudgeQueue::start(
                Arc::new(context.cascade(&collaborators)),
                &config.judging,
            ));
            let service = context.run_service(
                Arc::clone(&collaborators.summarizer),
                Arc::clone(&queue) as Arc<dyn EvaluationDispatcher>,
            );

            let submitted = service.submit_evaluation(variant_run_id, html_capture, elapsed).await;
            queue.shutdown().await;
            let submitted = submitted?;

            let evaluation = context
                .runs
                .get_evaluation(submitted.id)
                .await?
                .ok_or(DomainError::EvaluationNotFound(submitted.id))?;
            output(
                &EvaluationOutput {
                    variant_run: RunRef::variant_run(evaluation.variant_run_id),
                    evaluation,
                },
                json_mode,
            )?;
        }
    }
    Ok(())
}
