//! Application services: judging, aggregation, queueing and run lifecycle.

pub mod aggregation_cascade;
pub mod baseline_service;
pub mod evaluation_judge;
pub mod failure_summary;
pub mod judge_queue;
pub mod rollup;
pub mod run_service;
pub mod status_aggregator;
pub mod transcript_extraction;

pub use aggregation_cascade::{AggregationCascade, CascadeReport, EvaluationDispatcher};
pub use baseline_service::BaselineService;
pub use evaluation_judge::{EvaluationJudge, JudgeOutcome, JudgeReport};
pub use judge_queue::{JudgeQueue, QueueStats};
pub use rollup::{roll_up, RollupChild, RollupDecision, RollupParent};
pub use run_service::{RunService, StopReport};
pub use status_aggregator::{AggregateOutcome, LevelOutcome, StatusAggregator};
