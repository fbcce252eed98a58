//! Judge-then-aggregate pipeline for a single evaluation.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::RunRef;
use crate::domain::ports::{CatalogRepository, RunRepository};
use crate::services::evaluation_judge::{EvaluationJudge, JudgeReport};
use crate::services::status_aggregator::{LevelOutcome, StatusAggregator};

/// Hands a freshly submitted evaluation to whatever judges it.
#[async_trait]
pub trait EvaluationDispatcher: Send + Sync {
    /// Queue or run judging of the evaluation.
    async fn dispatch(&self, evaluation_id: Uuid) -> DomainResult<()>;
}

/// Everything one cascade did, bottom level first.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeReport {
    /// Judging step
    pub judge: JudgeReport,
    /// Aggregation attempts, variant run first
    pub levels: Vec<LevelOutcome>,
}

impl CascadeReport {
    /// The highest run that became terminal during this cascade.
    pub fn highest_completed(&self) -> Option<RunRef> {
        self.levels
            .iter()
            .rev()
            .find(|level| level.outcome.became_terminal())
            .map(|level| level.run)
    }
}

/// Judges an evaluation, then aggregates upward while levels settle.
pub struct AggregationCascade<R: RunRepository, C: CatalogRepository> {
    judge: EvaluationJudge<R, C>,
    aggregator: StatusAggregator<R>,
}

impl<R: RunRepository, C: CatalogRepository> AggregationCascade<R, C> {
    /// Cascade over `judge` and `aggregator`.
    pub fn new(judge: EvaluationJudge<R, C>, aggregator: StatusAggregator<R>) -> Self {
        Self { judge, aggregator }
    }

    /// Judge the evaluation, then aggregate its variant run, test run and
    /// suite run for as long as each level settles.
    ///
    /// Safe to run more than once for the same evaluation.
    pub async fn run_aggregation_cascade(&self, evaluation_id: Uuid) -> DomainResult<CascadeReport> {
        let judge = self.judge.judge(evaluation_id).await?;
        let levels = if judge.outcome.is_terminal() {
            self.aggregator
                .cascade_from(RunRef::variant_run(judge.variant_run_id))
                .await?
        } else {
            Vec::new()
        };

        Ok(CascadeReport { judge, levels })
    }
}

/// Runs the cascade in the caller's task.
#[async_trait]
impl<R: RunRepository, C: CatalogRepository> EvaluationDispatcher for AggregationCascade<R, C> {
    async fn dispatch(&self, evaluation_id: Uuid) -> DomainResult<()> {
        let report = self.run_aggregation_cascade(evaluation_id).await?;
        tracing::debug!(
            evaluation_id = %evaluation_id,
            outcome = ?report.judge.outcome,
            highest_completed = ?report.highest_completed(),
            "Cascade finished"
        );
        Ok(())
    }
}
