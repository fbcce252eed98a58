//! Domain entities: catalog, runs, statuses, transcripts and configuration.

pub mod catalog;
pub mod config;
pub mod run;
pub mod run_status;
pub mod transcript;

pub use catalog::{Baseline, Bot, EffectiveTestSettings, Suite, Test, DEFAULT_SUCCESS_CRITERIA};
pub use config::{Config, DatabaseConfig, JudgingConfig, LoggingConfig, OpenAiConfig, MIN_REQUESTS_PER_SECOND};
pub use run::{
    Evaluation, EvaluationFailure, EvaluationOutcome, RunLevel, RunRef, RunState, SuiteRun,
    TestRun, VariantRun, STOPPED_BY_USER,
};
pub use run_status::RunStatus;
pub use transcript::{Transcript, Turn};
