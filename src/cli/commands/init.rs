//! Implementation of the `chatcheck init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::fs;

use crate::adapters::sqlite::{database_url, initialize_database};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::CONFIG_DIR;

/// Arguments of `chatcheck init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.yaml
    #[arg(long, short)]
    pub force: bool,

    /// Target directory (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

/// Result of `chatcheck init`.
#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    /// Always true when printed
    pub success: bool,
    /// Summary line
    pub message: String,
    /// Project directory
    pub initialized_path: PathBuf,
    /// Whether config.yaml was written
    pub config_written: bool,
    /// Database file that was created or migrated
    pub database_path: PathBuf,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if self.config_written {
            lines.push(format!("Wrote {CONFIG_DIR}/config.yaml"));
        }
        lines.push(format!("Database ready at {}", self.database_path.display()));
        lines.join("\n")
    }
}

/// Create the project directory, config and database.
pub async fn execute(args: InitArgs, json_mode: bool) -> Result<()> {
    let target_path = if args.path.is_absolute() {
        args.path.clone()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(&args.path)
    };

    let config_dir = target_path.join(CONFIG_DIR);
    fs::create_dir_all(config_dir.join("logs"))
        .await
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    let config_path = config_dir.join("config.yaml");
    let config_written = args.force || !config_path.exists();
    if config_written {
        let yaml = serde_yaml::to_string(&Config::default()).context("Failed to serialize default config")?;
        fs::write(&config_path, yaml)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }

    let database_path = config_dir.join("chatcheck.db");
    let pool = initialize_database(&database_url(&database_path.to_string_lossy()), None)
        .await
        .context("Failed to initialize database")?;
    pool.close().await;

    let output_data = InitOutput {
        success: true,
        message: "Project initialized.".to_string(),
        initialized_path: target_path,
        config_written,
        database_path,
    };
    output(&output_data, json_mode)
}
