//! Run entities: evaluations and the three aggregation levels above them.
//!
//! Evaluation → VariantRun → TestRun → SuiteRun. Each run level carries the
//! same status block ([`RunState`]) and a child count fixed at creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::run_status::RunStatus;
use super::transcript::Transcript;
use crate::domain::errors::{DomainError, DomainResult};

/// Status text written when an operator stops a run.
pub const STOPPED_BY_USER: &str = "Stopped by user.";

/// Aggregation level of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunLevel {
    /// Replays of one variant, parent of evaluations
    VariantRun,
    /// One test in one environment, parent of variant runs
    TestRun,
    /// One suite in one environment, parent of test runs
    SuiteRun,
}

impl RunLevel {
    /// Storage and CLI name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VariantRun => "variant_run",
            Self::TestRun => "test_run",
            Self::SuiteRun => "suite_run",
        }
    }

    /// Parse a storage or CLI name; `variant`, `test` and `suite` are accepted too.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "variant_run" | "variant" => Some(Self::VariantRun),
            "test_run" | "test" => Some(Self::TestRun),
            "suite_run" | "suite" => Some(Self::SuiteRun),
            _ => None,
        }
    }

    /// Level this one rolls up into.
    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::VariantRun => Some(Self::TestRun),
            Self::TestRun => Some(Self::SuiteRun),
            Self::SuiteRun => None,
        }
    }
}

impl fmt::Display for RunLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::VariantRun => "variant run",
            Self::TestRun => "test run",
            Self::SuiteRun => "suite run",
        })
    }
}

/// Typed pointer to a run at some level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunRef {
    /// Level of the run
    pub level: RunLevel,
    /// Run id within that level
    pub id: Uuid,
}

impl RunRef {
    /// Point at run `id` on `level`.
    pub fn new(level: RunLevel, id: Uuid) -> Self {
        Self { level, id }
    }

    /// Point at a variant run.
    pub fn variant_run(id: Uuid) -> Self {
        Self::new(RunLevel::VariantRun, id)
    }

    /// Point at a test run.
    pub fn test_run(id: Uuid) -> Self {
        Self::new(RunLevel::TestRun, id)
    }

    /// Point at a suite run.
    pub fn suite_run(id: Uuid) -> Self {
        Self::new(RunLevel::SuiteRun, id)
    }

    /// `RunNotFound` for this run.
    pub fn not_found(&self) -> DomainError {
        DomainError::RunNotFound {
            level: self.level,
            id: self.id,
        }
    }
}

impl fmt::Display for RunRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.level, self.id)
    }
}

/// Status block shared by variant, test and suite runs. This is the read
/// contract for downstream reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Current status
    pub status: RunStatus,
    /// Failure or error reason; none while running and on Pass
    pub status_info: Option<String>,
    /// Set only when status is Pass, Fail or Mixed.
    pub pass_rate: Option<f64>,
    /// Mean replay time of the children; set with the pass rate
    pub average_elapsed_seconds: Option<f64>,
    /// Non-null iff status is terminal.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::running()
    }
}

impl RunState {
    /// Fresh state of a run that has not settled.
    pub fn running() -> Self {
        Self {
            status: RunStatus::Running,
            status_info: None,
            pass_rate: None,
            average_elapsed_seconds: None,
            completed_at: None,
        }
    }

    /// Terminal state carrying a pass rate. The status follows from the rate.
    pub fn scored(
        pass_rate: f64,
        average_elapsed_seconds: Option<f64>,
        status_info: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let status = RunStatus::from_pass_rate(pass_rate);
        Self {
            status,
            status_info: if status == RunStatus::Pass { None } else { status_info },
            pass_rate: Some(pass_rate),
            average_elapsed_seconds,
            completed_at: Some(completed_at),
        }
    }

    /// Terminal Error state without a pass rate.
    pub fn errored(status_info: impl Into<String>, completed_at: DateTime<Utc>) -> Self {
        Self::unscored(RunStatus::Error, status_info, completed_at)
    }

    /// Terminal Stopped state without a pass rate.
    pub fn stopped(status_info: impl Into<String>, completed_at: DateTime<Utc>) -> Self {
        Self::unscored(RunStatus::Stopped, status_info, completed_at)
    }

    fn unscored(status: RunStatus, status_info: impl Into<String>, completed_at: DateTime<Utc>) -> Self {
        Self {
            status,
            status_info: Some(status_info.into()),
            pass_rate: None,
            average_elapsed_seconds: None,
            completed_at: Some(completed_at),
        }
    }

    /// Whether the run has settled.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check that moving from this state to `next` respects the state machine
    /// and the terminal/completed_at/pass_rate invariants.
    pub fn check_completion(&self, next: &RunState) -> DomainResult<()> {
        if !self.status.can_transition_to(next.status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: next.status.as_str().to_string(),
                reason: "runs leave Running exactly once".to_string(),
            });
        }
        if next.completed_at.is_none() {
            return Err(DomainError::ValidationFailed(
                "terminal run state requires completed_at".to_string(),
            ));
        }
        if next.status.has_pass_rate() != next.pass_rate.is_some() {
            return Err(DomainError::ValidationFailed(format!(
                "pass_rate must be set iff status is pass, fail or mixed (status {})",
                next.status.as_str()
            )));
        }
        Ok(())
    }
}

/// Replays of one variant (interaction script) within a test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRun {
    /// Variant run id
    pub id: Uuid,
    /// Owning test run
    pub test_run_id: Uuid,
    /// Replay script this run executes
    pub variant_id: Uuid,
    /// Evaluations expected (the test's iteration count at creation)
    pub expected_children: u32,
    /// Status block
    #[serde(flatten)]
    pub state: RunState,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl VariantRun {
    /// New running variant run expecting `expected_children` evaluations.
    pub fn new(test_run_id: Uuid, variant_id: Uuid, expected_children: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_run_id,
            variant_id,
            expected_children,
            state: RunState::running(),
            created_at: Utc::now(),
        }
    }

    /// Typed pointer to this run.
    pub fn run_ref(&self) -> RunRef {
        RunRef::variant_run(self.id)
    }
}

/// One execution of a test in an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    /// Test run id
    pub id: Uuid,
    /// Test being run
    pub test_id: Uuid,
    /// Environment the bot was replayed in
    pub environment_id: Uuid,
    /// Owning suite run, if the test runs as part of one
    pub suite_run_id: Option<Uuid>,
    /// Variant runs expected (the test's variant count at creation)
    pub expected_children: u32,
    /// Status block
    #[serde(flatten)]
    pub state: RunState,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl TestRun {
    /// New running test run outside any suite run.
    pub fn new(test_id: Uuid, environment_id: Uuid, expected_children: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_id,
            environment_id,
            suite_run_id: None,
            expected_children,
            state: RunState::running(),
            created_at: Utc::now(),
        }
    }

    /// Attach the run to a suite run.
    pub fn in_suite_run(mut self, suite_run_id: Uuid) -> Self {
        self.suite_run_id = Some(suite_run_id);
        self
    }

    /// Typed pointer to this run.
    pub fn run_ref(&self) -> RunRef {
        RunRef::test_run(self.id)
    }
}

/// One execution of a whole suite in an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteRun {
    /// Suite run id
    pub id: Uuid,
    /// Suite being run
    pub suite_id: Uuid,
    /// Environment the bot was replayed in
    pub environment_id: Uuid,
    /// Test runs expected (tests enabled for full runs at creation)
    pub expected_children: u32,
    /// Status block
    #[serde(flatten)]
    pub state: RunState,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl SuiteRun {
    /// New running suite run expecting `expected_children` test runs.
    pub fn new(suite_id: Uuid, environment_id: Uuid, expected_children: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            suite_id,
            environment_id,
            expected_children,
            state: RunState::running(),
            created_at: Utc::now(),
        }
    }

    /// Typed pointer to this run.
    pub fn run_ref(&self) -> RunRef {
        RunRef::suite_run(self.id)
    }
}

/// Why judging an evaluation ended in Error rather than Pass or Fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationFailure {
    /// The capture yielded no transcript
    #[error("transcript extraction failed")]
    ExtractionFailed,

    /// The test has no baselines
    #[error("no baselines to compare against")]
    NoBaselines,

    /// A baseline has no resolved transcript
    #[error("baseline missing transcript")]
    BaselineIncomplete {
        /// Baseline without a transcript
        baseline_id: Uuid,
    },

    /// The judge reply did not decode into a verdict
    #[error("unparseable judge response")]
    JudgeUnparseable,

    /// The judge request itself failed
    #[error("judge request failed: {0}")]
    JudgeUnavailable(String),
}

/// Terminal result of judging one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    /// Matched a baseline
    Pass {
        /// First baseline the judge accepted
        baseline_id: Uuid,
    },
    /// Matched no baseline
    Fail {
        /// Summary of the verdict reasons
        reason: Option<String>,
    },
    /// Judging could not complete
    Error(EvaluationFailure),
}

impl EvaluationOutcome {
    /// Status the evaluation ends in.
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Pass { .. } => RunStatus::Pass,
            Self::Fail { .. } => RunStatus::Fail,
            Self::Error(_) => RunStatus::Error,
        }
    }
}

/// One judged replay of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Evaluation id
    pub id: Uuid,
    /// Owning variant run
    pub variant_run_id: Uuid,
    /// Captured HTML of the replayed conversation
    pub html_capture: String,
    /// Replay duration, finite and non-negative
    pub replayed_elapsed_seconds: f64,
    /// Current status
    pub status: RunStatus,
    /// Present iff status is Fail or Error.
    pub status_info: Option<String>,
    /// Transcript extracted from the capture, once extraction succeeded
    pub transcript: Option<Transcript>,
    /// Set iff status is Pass.
    pub matched_baseline_id: Option<Uuid>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Set when judging settles the evaluation
    pub completed_at: Option<DateTime<Utc>>,
}

impl Evaluation {
    /// New running evaluation.
    pub fn new(variant_run_id: Uuid, html_capture: impl Into<String>, replayed_elapsed_seconds: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            variant_run_id,
            html_capture: html_capture.into(),
            replayed_elapsed_seconds,
            status: RunStatus::Running,
            status_info: None,
            transcript: None,
            matched_baseline_id: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Whether the evaluation has been judged.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check the elapsed time is finite and non-negative.
    pub fn validate(&self) -> Result<(), String> {
        if !self.replayed_elapsed_seconds.is_finite() || self.replayed_elapsed_seconds < 0.0 {
            return Err(format!(
                "replayed elapsed seconds must be a finite value >= 0 (got {})",
                self.replayed_elapsed_seconds
            ));
        }
        Ok(())
    }

    /// Apply the terminal outcome. An evaluation transitions exactly once.
    pub fn complete(&mut self, outcome: EvaluationOutcome, completed_at: DateTime<Utc>) -> DomainResult<()> {
        let next = outcome.status();
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
                reason: format!("evaluation {} was already judged", self.id),
            });
        }

        match outcome {
            EvaluationOutcome::Pass { baseline_id } => {
                self.matched_baseline_id = Some(baseline_id);
                self.status_info = None;
            }
            EvaluationOutcome::Fail { reason } => {
                self.matched_baseline_id = None;
                self.status_info = Some(reason.unwrap_or_else(|| "no reason given".to_string()));
            }
            EvaluationOutcome::Error(failure) => {
                self.matched_baseline_id = None;
                self.status_info = Some(failure.to_string());
            }
        }
        self.status = next;
        self.completed_at = Some(completed_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scored_state_derives_status() {
        let now = Utc::now();
        let pass = RunState::scored(1.0, Some(1.2), Some("ignored".to_string()), now);
        assert_eq!(pass.status, RunStatus::Pass);
        assert_eq!(pass.status_info, None);

        let mixed = RunState::scored(0.6, Some(1.2), Some("two failed".to_string()), now);
        assert_eq!(mixed.status, RunStatus::Mixed);
        assert_eq!(mixed.status_info.as_deref(), Some("two failed"));
    }

    #[test]
    fn test_check_completion_rejects_terminal_rewrite() {
        let now = Utc::now();
        let done = RunState::scored(1.0, None, None, now);
        let err = done.check_completion(&RunState::errored("late", now)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_check_completion_requires_pass_rate_consistency() {
        let now = Utc::now();
        let mut broken = RunState::errored("boom", now);
        broken.pass_rate = Some(0.5);
        assert!(RunState::running().check_completion(&broken).is_err());
        assert!(RunState::running().check_completion(&RunState::errored("boom", now)).is_ok());
    }

    #[test]
    fn test_evaluation_completes_once() {
        let mut evaluation = Evaluation::new(Uuid::new_v4(), "<html/>", 1.5);
        let baseline_id = Uuid::new_v4();
        evaluation
            .complete(EvaluationOutcome::Pass { baseline_id }, Utc::now())
            .unwrap();
        assert_eq!(evaluation.status, RunStatus::Pass);
        assert_eq!(evaluation.matched_baseline_id, Some(baseline_id));
        assert!(evaluation.completed_at.is_some());

        let again = evaluation.complete(EvaluationOutcome::Fail { reason: None }, Utc::now());
        assert!(again.is_err());
        assert_eq!(evaluation.status, RunStatus::Pass);
    }

    #[test]
    fn test_evaluation_error_records_failure_text() {
        let mut evaluation = Evaluation::new(Uuid::new_v4(), "<html/>", 0.0);
        evaluation
            .complete(EvaluationOutcome::Error(EvaluationFailure::JudgeUnparseable), Utc::now())
            .unwrap();
        assert_eq!(evaluation.status, RunStatus::Error);
        assert_eq!(evaluation.status_info.as_deref(), Some("unparseable judge response"));
    }

    #[test]
    fn test_evaluation_rejects_negative_elapsed() {
        assert!(Evaluation::new(Uuid::new_v4(), "", -1.0).validate().is_err());
        assert!(Evaluation::new(Uuid::new_v4(), "", f64::NAN).validate().is_err());
        assert!(Evaluation::new(Uuid::new_v4(), "", 0.0).validate().is_ok());
    }

    #[test]
    fn test_run_level_parsing() {
        assert_eq!(RunLevel::from_str("suite-run"), Some(RunLevel::SuiteRun));
        assert_eq!(RunLevel::from_str("test"), Some(RunLevel::TestRun));
        assert_eq!(RunLevel::VariantRun.parent(), Some(RunLevel::TestRun));
        assert_eq!(RunLevel::SuiteRun.parent(), None);
    }
}
