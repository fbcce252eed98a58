//! Evaluation Judge Engine.
//!
//! Judges one evaluation against its test's baselines in creation order.
//! The first passing baseline wins; if none passes the failure reasons are
//! combined. Broken pipeline steps (extraction, incomplete baselines, an
//! unusable verdict) end the evaluation in Error rather than Fail.

use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Evaluation, EvaluationFailure, EvaluationOutcome, RunRef, RunStatus, Transcript,
};
use crate::domain::ports::{CatalogRepository, ConversationExtractor, FailureSummarizer, Judge, RunRepository};
use crate::services::failure_summary::summarize_reasons;
use crate::services::transcript_extraction::extract_transcript;

/// Reason recorded for a failing verdict that gave none.
pub const NO_REASON_GIVEN: &str = "no reason given";

/// What judging did to the evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeOutcome {
    /// The evaluation was terminal before this call.
    AlreadyJudged(RunStatus),
    /// The owning test run is stopped; nothing was judged.
    SkippedStopped,
    /// The evaluation was judged and the result stored.
    Judged(RunStatus),
    /// The result was computed but dropped because the test run was
    /// stopped while judging was in flight.
    Discarded,
}

impl JudgeOutcome {
    /// Whether the evaluation is terminal after this call, so its variant
    /// run is worth aggregating.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AlreadyJudged(_) | Self::Judged(_))
    }
}

/// What one judging call did to one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JudgeReport {
    /// Evaluation that was judged
    pub evaluation_id: Uuid,
    /// Its variant run, aggregated next
    pub variant_run_id: Uuid,
    /// What happened
    pub outcome: JudgeOutcome,
}

/// Judges evaluations against the baselines of their test.
pub struct EvaluationJudge<R: RunRepository, C: CatalogRepository> {
    runs: Arc<R>,
    catalog: Arc<C>,
    judge: Arc<dyn Judge>,
    extractor: Arc<dyn ConversationExtractor>,
    summarizer: Arc<dyn FailureSummarizer>,
}

impl<R: RunRepository, C: CatalogRepository> EvaluationJudge<R, C> {
    /// Engine reading runs and catalog through the repositories.
    pub fn new(
        runs: Arc<R>,
        catalog: Arc<C>,
        judge: Arc<dyn Judge>,
        extractor: Arc<dyn ConversationExtractor>,
        summarizer: Arc<dyn FailureSummarizer>,
    ) -> Self {
        Self {
            runs,
            catalog,
            judge,
            extractor,
            summarizer,
        }
    }

    /// Judge one evaluation and persist its terminal state.
    ///
    /// Errors are infrastructure failures (storage, missing parents) and
    /// leave the evaluation Running; collaborator failures are recorded on
    /// the evaluation instead.
    #[instrument(skip(self), fields(evaluation_id = %evaluation_id))]
    pub async fn judge(&self, evaluation_id: Uuid) -> DomainResult<JudgeReport> {
        let mut evaluation = self
            .runs
            .get_evaluation(evaluation_id)
            .await?
            .ok_or(DomainError::EvaluationNotFound(evaluation_id))?;
        let variant_run_id = evaluation.variant_run_id;
        let report = move |outcome| JudgeReport {
            evaluation_id,
            variant_run_id,
            outcome,
        };

        if evaluation.is_terminal() {
            tracing::debug!(status = %evaluation.status, "Evaluation already judged");
            return Ok(report(JudgeOutcome::AlreadyJudged(evaluation.status)));
        }

        let variant_run = self
            .runs
            .get_variant_run(evaluation.variant_run_id)
            .await?
            .ok_or_else(|| RunRef::variant_run(evaluation.variant_run_id).not_found())?;
        let test_run = self
            .runs
            .get_test_run(variant_run.test_run_id)
            .await?
            .ok_or_else(|| RunRef::test_run(variant_run.test_run_id).not_found())?;

        if test_run.state.status == RunStatus::Stopped {
            tracing::info!(test_run_id = %test_run.id, "Test run stopped, skipping judging");
            return Ok(report(JudgeOutcome::SkippedStopped));
        }

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
        let bot = self
            .catalog
            .get_bot(suite.bot_id)
            .await?
            .ok_or(DomainError::BotNotFound(suite.bot_id))?;
        let settings = test.effective(&suite);

        let outcome = match extract_transcript(
            self.catalog.as_ref(),
            self.extractor.as_ref(),
            &bot,
            &evaluation.html_capture,
        )
        .await
        {
            Some(transcript) => {
                let outcome = self.match_baselines(test.id, &settings.success_criteria, &transcript).await?;
                evaluation.transcript = Some(transcript);
                outcome
            }
            None => EvaluationOutcome::Error(EvaluationFailure::ExtractionFailed),
        };

        evaluation.complete(outcome, Utc::now())?;

        if self.runs.complete_evaluation(&evaluation).await? {
            tracing::info!(
                status = %evaluation.status,
                status_info = ?evaluation.status_info,
                matched_baseline_id = ?evaluation.matched_baseline_id,
                "Evaluation judged"
            );
            return Ok(report(JudgeOutcome::Judged(evaluation.status)));
        }

        // Either a concurrent delivery stored its result first or the test
        // run was stopped while we were judging.
        let stored = self
            .runs
            .get_evaluation(evaluation_id)
            .await?
            .ok_or(DomainError::EvaluationNotFound(evaluation_id))?;
        if stored.is_terminal() {
            Ok(report(JudgeOutcome::AlreadyJudged(stored.status)))
        } else {
            tracing::info!(test_run_id = %test_run.id, "Test run stopped during judging, result discarded");
            Ok(report(JudgeOutcome::Discarded))
        }
    }

    async fn match_baselines(
        &self,
        test_id: Uuid,
        success_criteria: &str,
        candidate: &Transcript,
    ) -> DomainResult<EvaluationOutcome> {
        let baselines = self.catalog.list_baselines(test_id).await?;
        if baselines.is_empty() {
            return Ok(EvaluationOutcome::Error(EvaluationFailure::NoBaselines));
        }

        let mut reasons = Vec::with_capacity(baselines.len());
        for baseline in &baselines {
            let Some(reference) = baseline.transcript.as_ref() else {
                tracing::warn!(baseline_id = %baseline.id, "Baseline has no resolved transcript");
                return Ok(EvaluationOutcome::Error(EvaluationFailure::BaselineIncomplete {
                    baseline_id: baseline.id,
                }));
            };

            match self.judge.evaluate(success_criteria, reference, candidate).await {
                Ok(verdict) if verdict.pass => {
                    tracing::debug!(baseline_id = %baseline.id, "Baseline matched");
                    return Ok(EvaluationOutcome::Pass {
                        baseline_id: baseline.id,
                    });
                }
                Ok(verdict) => {
                    let reason = verdict
                        .reason
                        .filter(|r| !r.trim().is_empty())
                        .unwrap_or_else(|| NO_REASON_GIVEN.to_string());
                    tracing::debug!(baseline_id = %baseline.id, reason = %reason, "Baseline did not match");
                    reasons.push(reason);
                }
                Err(DomainError::UnparseableResponse(detail)) => {
                    tracing::warn!(baseline_id = %baseline.id, detail = %detail, "Judge returned no usable verdict");
                    return Ok(EvaluationOutcome::Error(EvaluationFailure::JudgeUnparseable));
                }
                Err(e) => {
                    tracing::warn!(baseline_id = %baseline.id, error = %e, "Judge call failed");
                    return Ok(EvaluationOutcome::Error(EvaluationFailure::JudgeUnavailable(e.to_string())));
                }
            }
        }

        Ok(EvaluationOutcome::Fail {
            reason: summarize_reasons(self.summarizer.as_ref(), &reasons).await,
        })
    }
}
