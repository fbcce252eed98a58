//! Run status state machine shared by evaluations and every run level.
//!
//! ```text
//! Running → Pass | Fail | Mixed | Error | Stopped
//! Pass, Fail, Mixed, Error, Stopped → (absorbing)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an evaluation or run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created and waiting on judging or on children
    #[default]
    Running,
    /// Every child passed (or the evaluation matched a baseline)
    Pass,
    /// No child passed (or no baseline matched)
    Fail,
    /// Some children passed; only produced by aggregation
    Mixed,
    /// Judging pipeline broke, or a child errored
    Error,
    /// Manually cancelled, or a child was stopped
    Stopped,
}

impl RunStatus {
    /// Storage name, as written to the `status` columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Mixed => "mixed",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }

    /// Parse a storage name, case-insensitively.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "running" => Some(Self::Running),
            "pass" | "passed" => Some(Self::Pass),
            "fail" | "failed" => Some(Self::Fail),
            "mixed" => Some(Self::Mixed),
            "error" => Some(Self::Error),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Terminal states are absorbing.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<RunStatus> {
        match self {
            Self::Running => vec![Self::Pass, Self::Fail, Self::Mixed, Self::Error, Self::Stopped],
            Self::Pass | Self::Fail | Self::Mixed | Self::Error | Self::Stopped => vec![],
        }
    }

    /// Whether `new_status` is reachable in one step.
    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }

    /// Whether a parent with this status carries a pass rate.
    pub fn has_pass_rate(&self) -> bool {
        matches!(self, Self::Pass | Self::Fail | Self::Mixed)
    }

    /// Status implied by a computed pass rate.
    pub fn from_pass_rate(pass_rate: f64) -> Self {
        if pass_rate >= 1.0 {
            Self::Pass
        } else if pass_rate <= 0.0 {
            Self::Fail
        } else {
            Self::Mixed
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "Running",
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::Mixed => "Mixed",
            Self::Error => "Error",
            Self::Stopped => "Stopped",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_reaches_every_terminal_state() {
        for status in [
            RunStatus::Pass,
            RunStatus::Fail,
            RunStatus::Mixed,
            RunStatus::Error,
            RunStatus::Stopped,
        ] {
            assert!(RunStatus::Running.can_transition_to(status));
            assert!(status.is_terminal());
            assert!(status.valid_transitions().is_empty());
        }
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Running));
    }

    #[test]
    fn test_round_trip_storage_names() {
        for status in [
            RunStatus::Running,
            RunStatus::Pass,
            RunStatus::Fail,
            RunStatus::Mixed,
            RunStatus::Error,
            RunStatus::Stopped,
        ] {
            assert_eq!(RunStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::from_str("Passed"), Some(RunStatus::Pass));
        assert_eq!(RunStatus::from_str("skipped"), None);
    }

    #[test]
    fn test_default_is_running() {
        assert_eq!(RunStatus::default(), RunStatus::Running);
    }

    #[test]
    fn test_from_pass_rate() {
        assert_eq!(RunStatus::from_pass_rate(1.0), RunStatus::Pass);
        assert_eq!(RunStatus::from_pass_rate(0.0), RunStatus::Fail);
        assert_eq!(RunStatus::from_pass_rate(0.6), RunStatus::Mixed);
    }
}
