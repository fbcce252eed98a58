//! Logger settings derived from the `logging` configuration section.

use std::path::PathBuf;

use crate::domain::models::LoggingConfig;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format of every layer
    pub format: LogFormat,

    /// Directory for log files; stderr only when `None`
    pub log_dir: Option<PathBuf>,

    /// Whether the console layer writes to stderr
    pub enable_stderr: bool,

    /// How often the log file rolls over
    pub rotation: RotationPolicy,

    /// Log retention in days
    pub retention_days: u32,
}

/// Rendering of log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable multi-line output
    Pretty,
}

impl LogFormat {
    /// Parse a format name, case-insensitively.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Rollover schedule of the log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RotationPolicy {
    /// New file every day
    #[default]
    Daily,
    /// New file every hour
    Hourly,
    /// Single file
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from(&LoggingConfig::default())
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            format: LogFormat::from_str(&config.format).unwrap_or(LogFormat::Json),
            log_dir: config.log_dir.as_ref().map(PathBuf::from),
            enable_stderr: true,
            rotation: RotationPolicy::default(),
            retention_days: config.retention_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_logging_config() {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            format: "Pretty".to_string(),
            retention_days: 7,
            log_dir: Some("/var/log/chatcheck".to_string()),
        };

        let config = LogConfig::from(&logging);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/chatcheck")));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.rotation, RotationPolicy::Daily);
    }
}
