//! `chatcheck baseline` commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::cli::context::{AppContext, Collaborators};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, Transcript};

/// Baseline commands.
#[derive(Args, Debug)]
pub struct BaselineArgs {
    /// Baseline subcommand
    #[command(subcommand)]
    pub command: BaselineCommands,
}

/// Subcommands of `chatcheck baseline`.
#[derive(Subcommand, Debug)]
pub enum BaselineCommands {
    /// Extract and store a baseline's transcript
    Resolve {
        /// Baseline id
        id: Uuid,
        /// Use the offline scripted extractor instead of OpenAI
        #[arg(long)]
        scripted: bool,
    },
}

/// Result of `baseline resolve`.
#[derive(Debug, serde::Serialize)]
pub struct BaselineOutput {
    /// Baseline id
    pub id: Uuid,
    /// Baseline name
    pub name: String,
    /// Stored transcript
    pub transcript: Option<Transcript>,
}

impl CommandOutput for BaselineOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Resolved baseline {} ({})", self.name, self.id)];
        if let Some(transcript) = &self.transcript {
            for turn in transcript.turns() {
                lines.push(format!("  {}: {}", console::style(&turn.author).bold(), turn.message));
            }
        }
        lines.join("\n")
    }
}

/// Run a baseline subcommand.
pub async fn execute(args: BaselineArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        BaselineCommands::Resolve { id, scripted } => {
            let context = AppContext::open(config).await?;
            let collaborators = Collaborators::select(config, scripted)?;
            let baseline = context
                .baseline_service(collaborators.extractor)
                .resolve_transcript(id)
                .await?;

            output(
                &BaselineOutput {
                    id: baseline.id,
                    name: baseline.name,
                    transcript: baseline.transcript,
                },
                json_mode,
            )?;
        }
    }
    Ok(())
}
