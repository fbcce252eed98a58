//! Deletion of log files older than the retention period.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{info, warn};

/// Delete `*.log*` files in `log_dir` last modified more than
/// `retention_days` ago. Returns how many were deleted.
pub async fn cleanup_old_logs(log_dir: impl AsRef<Path>, retention_days: u32) -> Result<usize> {
    let log_dir = log_dir.as_ref();
    if !log_dir.exists() {
        warn!(path = %log_dir.display(), "log directory does not exist");
        return Ok(0);
    }

    let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
    let mut deleted = 0;

    let mut entries = tokio::fs::read_dir(log_dir)
        .await
        .context("failed to read log directory")?;
    while let Some(entry) = entries.next_entry().await.context("failed to read directory entry")? {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.contains(".log"));
        if !is_log {
            continue;
        }

        let modified: DateTime<Utc> = entry
            .metadata()
            .await
            .context("failed to get file metadata")?
            .modified()
            .context("failed to get file modification time")?
            .into();

        if modified < cutoff {
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("failed to delete {}", path.display()))?;
            deleted += 1;
        }
    }

    if deleted > 0 {
        info!(count = deleted, "cleaned up old log files");
    }
    Ok(deleted)
}
