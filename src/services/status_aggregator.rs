//! Status aggregation across the run hierarchy.
//!
//! One generic routine ([`StatusAggregator::aggregate_level`]) recomputes a
//! parent from its children; the per-level methods only bind which parent
//! and which children to load. The final write is a compare-and-set, so
//! redundant or concurrent invocations for the same parent settle on a
//! single terminal state.

use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{RunLevel, RunRef, RunState, RunStatus};
use crate::domain::ports::{FailureSummarizer, RunRepository};
use crate::services::failure_summary::summarize_reasons;
use crate::services::rollup::{roll_up, RollupChild, RollupDecision, RollupParent};

/// Status text of a parent with an errored child.
pub const CHILD_ERROR_INFO: &str = "one or more children contained an error";
/// Status text of a parent with a stopped child and no errored one.
pub const CHILD_STOPPED_INFO: &str = "one or more children were stopped";

/// What a single aggregation attempt did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateOutcome {
    /// The parent was terminal before this call; nothing was written.
    AlreadyTerminal(RunStatus),
    /// Children missing or still running; nothing was written.
    Waiting {
        /// Children already settled
        terminal: usize,
        /// Children the parent expects
        expected: usize,
    },
    /// This call moved the parent to a terminal state.
    Completed(RunStatus),
    /// Another writer completed the parent between our read and our write.
    LostRace,
}

impl AggregateOutcome {
    /// Whether the parent became terminal during this call.
    pub fn became_terminal(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Whether the parent is known to be terminal now. Cascades continue
    /// upward from settled levels so that an interrupted cascade is repaired
    /// when a job is redelivered.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Waiting { .. })
    }
}

/// Aggregation result for one run, with the run it rolls up into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelOutcome {
    /// Run that was aggregated
    pub run: RunRef,
    /// Run it rolls up into, if any
    pub parent: Option<RunRef>,
    /// What the attempt did
    pub outcome: AggregateOutcome,
}

/// Recomputes variant, test and suite runs from their children.
pub struct StatusAggregator<R: RunRepository> {
    runs: Arc<R>,
    summarizer: Arc<dyn FailureSummarizer>,
}

impl<R: RunRepository> Clone for StatusAggregator<R> {
    fn clone(&self) -> Self {
        Self {
            runs: Arc::clone(&self.runs),
            summarizer: Arc::clone(&self.summarizer),
        }
    }
}

impl<R: RunRepository> StatusAggregator<R> {
    /// Aggregator writing through `runs`; `summarizer` merges failure reasons.
    pub fn new(runs: Arc<R>, summarizer: Arc<dyn FailureSummarizer>) -> Self {
        Self { runs, summarizer }
    }

    /// Aggregate whichever run `run` points at.
    pub async fn aggregate(&self, run: RunRef) -> DomainResult<LevelOutcome> {
        match run.level {
            RunLevel::VariantRun => self.aggregate_variant_run(run.id).await,
            RunLevel::TestRun => self.aggregate_test_run(run.id).await,
            RunLevel::SuiteRun => self.aggregate_suite_run(run.id).await,
        }
    }

    /// Roll evaluations up into a variant run.
    pub async fn aggregate_variant_run(&self, id: Uuid) -> DomainResult<LevelOutcome> {
        let run = self
            .runs
            .get_variant_run(id)
            .await?
            .ok_or_else(|| RunRef::variant_run(id).not_found())?;
        let children = if run.state.is_terminal() {
            Vec::new()
        } else {
            self.runs.list_evaluations(id).await?
        };
        self.aggregate_level(&run, &children).await
    }

    /// Roll variant runs up into a test run.
    pub async fn aggregate_test_run(&self, id: Uuid) -> DomainResult<LevelOutcome> {
        let run = self
            .runs
            .get_test_run(id)
            .await?
            .ok_or_else(|| RunRef::test_run(id).not_found())?;
        let children = if run.state.is_terminal() {
            Vec::new()
        } else {
            self.runs.list_variant_runs(id).await?
        };
        self.aggregate_level(&run, &children).await
    }

    /// Roll test runs up into a suite run.
    pub async fn aggregate_suite_run(&self, id: Uuid) -> DomainResult<LevelOutcome> {
        let run = self
            .runs
            .get_suite_run(id)
            .await?
            .ok_or_else(|| RunRef::suite_run(id).not_found())?;
        let children = if run.state.is_terminal() {
            Vec::new()
        } else {
            self.runs.list_test_runs(id).await?
        };
        self.aggregate_level(&run, &children).await
    }

    /// Recompute `parent` from `children` and persist the result if every
    /// expected child is terminal.
    #[instrument(skip_all, fields(run_id = %parent.run_ref().id, level = %parent.run_ref().level))]
    pub async fn aggregate_level<P, C>(&self, parent: &P, children: &[C]) -> DomainResult<LevelOutcome>
    where
        P: RollupParent + Sync,
        C: RollupChild + Sync,
    {
        let run = parent.run_ref();
        let level_outcome = |outcome| LevelOutcome {
            run,
            parent: parent.parent_ref(),
            outcome,
        };

        if parent.state().is_terminal() {
            tracing::debug!(status = %parent.state().status, "Run already terminal");
            return Ok(level_outcome(AggregateOutcome::AlreadyTerminal(parent.state().status)));
        }

        let now = Utc::now();
        let state = match roll_up(parent.expected_children(), children) {
            RollupDecision::Waiting { terminal, expected } => {
                tracing::debug!(terminal, expected, children = children.len(), "Run still waiting on children");
                return Ok(level_outcome(AggregateOutcome::Waiting { terminal, expected }));
            }
            RollupDecision::Errored => RunState::errored(CHILD_ERROR_INFO, now),
            RollupDecision::Stopped => RunState::stopped(CHILD_STOPPED_INFO, now),
            RollupDecision::Scored {
                pass_rate,
                average_elapsed_seconds,
                failure_reasons,
            } => {
                let status_info = if RunStatus::from_pass_rate(pass_rate) == RunStatus::Pass {
                    None
                } else {
                    summarize_reasons(self.summarizer.as_ref(), &failure_reasons).await
                };
                RunState::scored(pass_rate, average_elapsed_seconds, status_info, now)
            }
        };

        if self.runs.complete_run(run, &state).await? {
            tracing::info!(
                status = %state.status,
                pass_rate = ?state.pass_rate,
                average_elapsed_seconds = ?state.average_elapsed_seconds,
                "Run completed"
            );
            Ok(level_outcome(AggregateOutcome::Completed(state.status)))
        } else {
            tracing::debug!("Run completed concurrently by another writer");
            Ok(level_outcome(AggregateOutcome::LostRace))
        }
    }

    /// Aggregate `start`, then keep climbing while each level is settled.
    pub async fn cascade_from(&self, start: RunRef) -> DomainResult<Vec<LevelOutcome>> {
        let mut outcomes = Vec::new();
        let mut next = Some(start);

        while let Some(run) = next {
            let level = self.aggregate(run).await?;
            next = if level.outcome.is_settled() { level.parent } else { None };
            outcomes.push(level);
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted::JoiningSummarizer;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteCatalogRepository, SqliteRunRepository};
    use crate::domain::models::{Bot, Evaluation, EvaluationFailure, EvaluationOutcome, Suite, SuiteRun, Test, TestRun, VariantRun};
    use crate::domain::ports::CatalogRepository;

    struct Fixture {
        runs: Arc<SqliteRunRepository>,
        aggregator: StatusAggregator<SqliteRunRepository>,
        test_id: Uuid,
        suite_id: Uuid,
    }

    async fn setup() -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let catalog = SqliteCatalogRepository::new(pool.clone());
        let bot = Bot::new("bot");
        catalog.create_bot(&bot).await.unwrap();
        let suite = Suite::new(bot.id, "suite");
        catalog.create_suite(&suite).await.unwrap();
        let test = Test::new(suite.id, "test");
        catalog.create_test(&test).await.unwrap();

        let runs = Arc::new(SqliteRunRepository::new(pool));
        Fixture {
            aggregator: StatusAggregator::new(Arc::clone(&runs), Arc::new(JoiningSummarizer)),
            runs,
            test_id: test.id,
            suite_id: suite.id,
        }
    }

    async fn variant_run_with(fx: &Fixture, expected: u32, outcomes: Vec<EvaluationOutcome>) -> VariantRun {
        let test_run = TestRun::new(fx.test_id, Uuid::new_v4(), 1);
        fx.runs.create_test_run(&test_run).await.unwrap();
        let variant_run = VariantRun::new(test_run.id, Uuid::new_v4(), expected);
        fx.runs.create_variant_run(&variant_run).await.unwrap();

        for (i, outcome) in outcomes.into_iter().enumerate() {
            let mut evaluation = Evaluation::new(variant_run.id, "<html/>", f64::from(u32::try_from(i).unwrap()));
            fx.runs.create_evaluation(&evaluation).await.unwrap();
            evaluation.complete(outcome, Utc::now()).unwrap();
            assert!(fx.runs.complete_evaluation(&evaluation).await.unwrap());
        }
        variant_run
    }

    fn pass() -> EvaluationOutcome {
        EvaluationOutcome::Pass { baseline_id: Uuid::new_v4() }
    }

    fn fail(reason: &str) -> EvaluationOutcome {
        EvaluationOutcome::Fail { reason: Some(reason.to_string()) }
    }

    #[tokio::test]
    async fn test_variant_run_waits_for_all_iterations() {
        let fx = setup().await;
        let run = variant_run_with(&fx, 5, vec![pass(), pass(), pass(), pass()]).await;

        let level = fx.aggregator.aggregate_variant_run(run.id).await.unwrap();
        assert_eq!(level.outcome, AggregateOutcome::Waiting { terminal: 4, expected: 5 });

        let stored = fx.runs.get_variant_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.state, RunState::running());
    }

    #[tokio::test]
    async fn test_variant_run_mixed_with_joined_reasons() {
        let fx = setup().await;
        let run = variant_run_with(&fx, 5, vec![pass(), pass(), pass(), fail("too curt"), fail("wrong price")]).await;

        let level = fx.aggregator.aggregate_variant_run(run.id).await.unwrap();
        assert_eq!(level.outcome, AggregateOutcome::Completed(RunStatus::Mixed));
        assert_eq!(level.parent, Some(RunRef::test_run(run.test_run_id)));

        let stored = fx.runs.get_variant_run(run.id).await.unwrap().unwrap();
        assert!((stored.state.pass_rate.unwrap() - 0.6).abs() < 1e-9);
        assert!((stored.state.average_elapsed_seconds.unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(stored.state.status_info.as_deref(), Some("too curt; wrong price"));
    }

    #[tokio::test]
    async fn test_error_child_poisons_parent() {
        let fx = setup().await;
        let run = variant_run_with(
            &fx,
            3,
            vec![pass(), EvaluationOutcome::Error(EvaluationFailure::ExtractionFailed), pass()],
        )
        .await;

        let level = fx.aggregator.aggregate_variant_run(run.id).await.unwrap();
        assert_eq!(level.outcome, AggregateOutcome::Completed(RunStatus::Error));

        let stored = fx.runs.get_variant_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.state.status_info.as_deref(), Some(CHILD_ERROR_INFO));
        assert_eq!(stored.state.pass_rate, None);
        assert_eq!(stored.state.average_elapsed_seconds, None);
    }

    #[tokio::test]
    async fn test_second_aggregation_is_noop() {
        let fx = setup().await;
        let run = variant_run_with(&fx, 2, vec![pass(), pass()]).await;

        fx.aggregator.aggregate_variant_run(run.id).await.unwrap();
        let first = fx.runs.get_variant_run(run.id).await.unwrap().unwrap();

        let level = fx.aggregator.aggregate_variant_run(run.id).await.unwrap();
        assert_eq!(level.outcome, AggregateOutcome::AlreadyTerminal(RunStatus::Pass));
        let second = fx.runs.get_variant_run(run.id).await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_concurrent_aggregations_produce_one_winner() {
        let fx = setup().await;
        let run = variant_run_with(&fx, 3, vec![pass(), fail("off topic"), pass()]).await;

        let (a, b) = tokio::join!(
            fx.aggregator.aggregate_variant_run(run.id),
            fx.aggregator.aggregate_variant_run(run.id)
        );
        let outcomes = [a.unwrap().outcome, b.unwrap().outcome];
        let completed = outcomes.iter().filter(|o| o.became_terminal()).count();
        assert_eq!(completed, 1);
        assert!(outcomes.iter().all(AggregateOutcome::is_settled));
    }

    #[tokio::test]
    async fn test_cascade_stops_at_waiting_level() {
        let fx = setup().await;
        let suite_run = SuiteRun::new(fx.suite_id, Uuid::new_v4(), 2);
        fx.runs.create_suite_run(&suite_run).await.unwrap();
        let test_run = TestRun::new(fx.test_id, suite_run.environment_id, 1).in_suite_run(suite_run.id);
        fx.runs.create_test_run(&test_run).await.unwrap();
        let variant_run = VariantRun::new(test_run.id, Uuid::new_v4(), 1);
        fx.runs.create_variant_run(&variant_run).await.unwrap();
        let mut evaluation = Evaluation::new(variant_run.id, "<html/>", 1.0);
        fx.runs.create_evaluation(&evaluation).await.unwrap();
        evaluation.complete(pass(), Utc::now()).unwrap();
        fx.runs.complete_evaluation(&evaluation).await.unwrap();

        let levels = fx.aggregator.cascade_from(variant_run.run_ref()).await.unwrap();
        let outcomes: Vec<_> = levels.iter().map(|l| l.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                AggregateOutcome::Completed(RunStatus::Pass),
                AggregateOutcome::Completed(RunStatus::Pass),
                AggregateOutcome::Waiting { terminal: 1, expected: 2 },
            ]
        );
    }
}
