//! Run lifecycle: creating runs, submitting evaluations and manual stop.

use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Evaluation, RunLevel, RunRef, RunState, SuiteRun, TestRun, VariantRun, STOPPED_BY_USER,
};
use crate::domain::ports::{CatalogRepository, RunRepository};
use crate::services::aggregation_cascade::EvaluationDispatcher;
use crate::services::status_aggregator::{LevelOutcome, StatusAggregator};

/// Result of a manual stop.
#[derive(Debug, Clone, PartialEq)]
pub struct StopReport {
    /// Run the stop was requested for
    pub run: RunRef,
    /// False when the run was already terminal.
    pub stopped: bool,
    /// Test runs stopped alongside a suite run.
    pub cascaded: Vec<Uuid>,
    /// Aggregation triggered above a stopped test run.
    pub parent: Option<LevelOutcome>,
}

/// Entry point for run creation, submission, stop and status reads.
pub struct RunService<R: RunRepository, C: CatalogRepository> {
    runs: Arc<R>,
    catalog: Arc<C>,
    aggregator: StatusAggregator<R>,
    dispatcher: Arc<dyn EvaluationDispatcher>,
}

impl<R: RunRepository, C: CatalogRepository> RunService<R, C> {
    /// Service dispatching submitted evaluations to `dispatcher`.
    pub fn new(
        runs: Arc<R>,
        catalog: Arc<C>,
        aggregator: StatusAggregator<R>,
        dispatcher: Arc<dyn EvaluationDispatcher>,
    ) -> Self {
        Self {
            runs,
            catalog,
            aggregator,
            dispatcher,
        }
    }

    /// Start a suite run expecting one test run per test enabled for full
    /// runs at this moment.
    #[instrument(skip(self))]
    pub async fn start_suite_run(&self, suite_id: Uuid, environment_id: Uuid) -> DomainResult<SuiteRun> {
        self.catalog
            .get_suite(suite_id)
            .await?
            .ok_or(DomainError::SuiteNotFound(suite_id))?;

        let tests = self.catalog.list_tests(suite_id).await?;
        let enabled = tests.iter().filter(|t| t.full_run_enabled).count();
        if enabled == 0 {
            return Err(DomainError::ValidationFailed(format!(
                "suite {suite_id} has no tests enabled for full runs"
            )));
        }
        let expected = u32::try_from(enabled)
            .map_err(|_| DomainError::ValidationFailed(format!("too many tests in suite {suite_id}")))?;

        let run = SuiteRun::new(suite_id, environment_id, expected);
        self.runs.create_suite_run(&run).await?;
        tracing::info!(suite_run_id = %run.id, expected, "Suite run started");
        Ok(run)
    }

    /// Start a test run expecting the test's effective variant count.
    #[instrument(skip(self))]
    pub async fn start_test_run(
        &self,
        test_id: Uuid,
        environment_id: Uuid,
        suite_run_id: Option<Uuid>,
    ) -> DomainResult<TestRun> {
        let test = self
            .catalog
            .get_test(test_id)
            .await?
            .ok_or(DomainError::TestNotFound(test_id))?;
        let suite = self
            .catalog
            .get_suite(test.suite_id)
            .await?
            .ok_or(DomainError::SuiteNotFound(test.suite_id))?;

        let mut run = TestRun::new(test_id, environment_id, test.effective(&suite).variant_count);

        if let Some(suite_run_id) = suite_run_id {
            let suite_run = self
                .runs
                .get_suite_run(suite_run_id)
                .await?
                .ok_or_else(|| RunRef::suite_run(suite_run_id).not_found())?;
            ensure_open(suite_run.run_ref(), &suite_run.state)?;
            if suite_run.suite_id != test.suite_id {
                return Err(DomainError::ValidationFailed(format!(
                    "test {test_id} does not belong to the suite of suite run {suite_run_id}"
                )));
            }
            if suite_run.environment_id != environment_id {
                return Err(DomainError::ValidationFailed(format!(
                    "suite run {suite_run_id} runs in environment {}",
                    suite_run.environment_id
                )));
            }
            run = run.in_suite_run(suite_run_id);
        }

        self.runs.create_test_run(&run).await?;
        tracing::info!(test_run_id = %run.id, expected = run.expected_children, "Test run started");
        Ok(run)
    }

    /// Start a variant run expecting the test's effective iteration count.
    #[instrument(skip(self))]
    pub async fn start_variant_run(&self, test_run_id: Uuid, variant_id: Uuid) -> DomainResult<VariantRun> {
        let test_run = self
            .runs
            .get_test_run(test_run_id)
            .await?
            .ok_or_else(|| RunRef::test_run(test_run_id).not_found())?;
        ensure_open(test_run.run_ref(), &test_run.state)?;

        let test = self
            .catalog
            .get_test(test_run.test_id)
            .await?
            .ok_or(DomainError::TestNotFound(test_run.test_id))?;
        let suite = self
            .catalog
            .get_suite(test.suite_id)
            .await?
            .ok_or(DomainError::SuiteNotFound(test.suite_id))?;

        let run = VariantRun::new(test_run_id, variant_id, test.effective(&suite).iteration_count);
        self.runs.create_variant_run(&run).await?;
        tracing::info!(variant_run_id = %run.id, expected = run.expected_children, "Variant run started");
        Ok(run)
    }

    /// Record a replayed conversation and hand it off for judging.
    ///
    /// Returns the evaluation as created, in Running state.
    #[instrument(skip(self, html_capture), fields(html_len = html_capture.len()))]
    pub async fn submit_evaluation(
        &self,
        variant_run_id: Uuid,
        html_capture: String,
        replayed_elapsed_seconds: f64,
    ) -> DomainResult<Evaluation> {
        let variant_run = self
            .runs
            .get_variant_run(variant_run_id)
            .await?
            .ok_or_else(|| RunRef::variant_run(variant_run_id).not_found())?;
        ensure_open(variant_run.run_ref(), &variant_run.state)?;

        let evaluation = Evaluation::new(variant_run_id, html_capture, replayed_elapsed_seconds);
        evaluation.validate().map_err(DomainError::ValidationFailed)?;
        self.runs.create_evaluation(&evaluation).await?;
        tracing::info!(evaluation_id = %evaluation.id, "Evaluation submitted");

        self.dispatcher.dispatch(evaluation.id).await?;
        Ok(evaluation)
    }

    /// Manually stop a suite run or a test run.
    ///
    /// Stopping a suite run also stops its still-running test runs. Stopping
    /// a test run that belongs to a suite run re-aggregates the suite run.
    #[instrument(skip(self))]
    pub async fn stop_run(&self, run: RunRef) -> DomainResult<StopReport> {
        let now = Utc::now();
        match run.level {
            RunLevel::SuiteRun => {
                let stopped = self.runs.stop_suite_run(run.id, STOPPED_BY_USER, now).await?;
                let Some(cascaded) = stopped else {
                    self.runs.get_suite_run(run.id).await?.ok_or_else(|| run.not_found())?;
                    tracing::info!(suite_run_id = %run.id, "Suite run already terminal");
                    return Ok(StopReport {
                        run,
                        stopped: false,
                        cascaded: Vec::new(),
                        parent: None,
                    });
                };
                tracing::info!(suite_run_id = %run.id, test_runs = cascaded.len(), "Suite run stopped by user");
                Ok(StopReport {
                    run,
                    stopped: true,
                    cascaded,
                    parent: None,
                })
            }
            RunLevel::TestRun => {
                let test_run = self
                    .runs
                    .get_test_run(run.id)
                    .await?
                    .ok_or_else(|| run.not_found())?;
                let stopped = self.runs.stop_test_run(run.id, STOPPED_BY_USER, now).await?;
                if stopped {
                    tracing::info!(test_run_id = %run.id, "Test run stopped by user");
                }

                let parent = match test_run.suite_run_id {
                    Some(suite_run_id) if stopped => {
                        Some(self.aggregator.aggregate(RunRef::suite_run(suite_run_id)).await?)
                    }
                    _ => None,
                };

                Ok(StopReport {
                    run,
                    stopped,
                    cascaded: Vec::new(),
                    parent,
                })
            }
            RunLevel::VariantRun => Err(DomainError::ValidationFailed(
                "only suite runs and test runs can be stopped".to_string(),
            )),
        }
    }

    /// Status block of any run.
    pub async fn get_run_state(&self, run: RunRef) -> DomainResult<RunState> {
        let state = match run.level {
            RunLevel::VariantRun => self.runs.get_variant_run(run.id).await?.map(|r| r.state),
            RunLevel::TestRun => self.runs.get_test_run(run.id).await?.map(|r| r.state),
            RunLevel::SuiteRun => self.runs.get_suite_run(run.id).await?.map(|r| r.state),
        };
        state.ok_or_else(|| run.not_found())
    }
}

fn ensure_open(run: RunRef, state: &RunState) -> DomainResult<()> {
    if state.is_terminal() {
        return Err(DomainError::InvalidStateTransition {
            from: state.status.as_str().to_string(),
            to: "running".to_string(),
            reason: format!("{run} is already complete"),
        });
    }
    Ok(())
}
