//! Chatcheck - chatbot regression judging
//!
//! Judges replayed chatbot conversations against baseline conversations and
//! rolls evaluation results up through variant runs, test runs and suite runs.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): run entities, status rules and ports
//! - **Adapter Layer** (`adapters`): SQLite storage, OpenAI collaborators,
//!   scripted collaborators for tests and offline use
//! - **Service Layer** (`services`): judging, aggregation, run lifecycle
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): operator commands

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, Evaluation, EvaluationFailure, EvaluationOutcome, RunLevel, RunRef, RunState, RunStatus, SuiteRun,
    TestRun, Transcript, Turn, VariantRun,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{AggregationCascade, EvaluationJudge, JudgeQueue, RunService, StatusAggregator};
