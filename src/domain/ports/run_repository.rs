//! Run repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Evaluation, RunRef, RunState, SuiteRun, TestRun, VariantRun};

/// Repository interface for run lifecycle persistence.
///
/// Terminal states are absorbing: every completing write is conditional on
/// the row still being Running, and reports whether it took effect. Two
/// writers racing on the same row therefore produce exactly one winner.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Insert a new suite run.
    async fn create_suite_run(&self, run: &SuiteRun) -> DomainResult<()>;

    /// Load a suite run.
    async fn get_suite_run(&self, id: Uuid) -> DomainResult<Option<SuiteRun>>;

    /// Insert a new test run. Fails when its suite run has settled.
    async fn create_test_run(&self, run: &TestRun) -> DomainResult<()>;

    /// Load a test run.
    async fn get_test_run(&self, id: Uuid) -> DomainResult<Option<TestRun>>;

    /// Test runs belonging to a suite run.
    async fn list_test_runs(&self, suite_run_id: Uuid) -> DomainResult<Vec<TestRun>>;

    /// Insert a new variant run.
    async fn create_variant_run(&self, run: &VariantRun) -> DomainResult<()>;

    /// Load a variant run.
    async fn get_variant_run(&self, id: Uuid) -> DomainResult<Option<VariantRun>>;

    /// Variant runs belonging to a test run.
    async fn list_variant_runs(&self, test_run_id: Uuid) -> DomainResult<Vec<VariantRun>>;

    /// Insert a new evaluation.
    async fn create_evaluation(&self, evaluation: &Evaluation) -> DomainResult<()>;

    /// Load an evaluation.
    async fn get_evaluation(&self, id: Uuid) -> DomainResult<Option<Evaluation>>;

    /// Evaluations belonging to a variant run.
    async fn list_evaluations(&self, variant_run_id: Uuid) -> DomainResult<Vec<Evaluation>>;

    /// Persist a judged evaluation.
    ///
    /// Returns false without writing when the stored evaluation is no longer
    /// Running, or when its owning test run has been stopped.
    async fn complete_evaluation(&self, evaluation: &Evaluation) -> DomainResult<bool>;

    /// Write the terminal state of a run. Returns false when the run was
    /// already terminal.
    async fn complete_run(&self, run: RunRef, state: &RunState) -> DomainResult<bool>;

    /// Force a running test run to Stopped. Returns false when it was
    /// already terminal.
    async fn stop_test_run(&self, id: Uuid, status_info: &str, at: DateTime<Utc>) -> DomainResult<bool>;

    /// Force a running suite run and its still-running test runs to Stopped
    /// in one transaction.
    ///
    /// Returns `None` when the suite run was already terminal, otherwise the
    /// ids of the test runs stopped alongside it.
    async fn stop_suite_run(&self, id: Uuid, status_info: &str, at: DateTime<Utc>) -> DomainResult<Option<Vec<Uuid>>>;
}
