//! Wiring of repositories, collaborators and services for one command.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::adapters::openai::{OpenAiClient, OpenAiExtractor, OpenAiJudge, OpenAiSummarizer};
use crate::adapters::scripted::{JoiningSummarizer, ScriptedExtractor, ScriptedJudge};
use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig, SqliteCatalogRepository, SqliteRunRepository};
use crate::domain::models::Config;
use crate::domain::ports::{ConversationExtractor, FailureSummarizer, Judge};
use crate::services::{AggregationCascade, BaselineService, EvaluationDispatcher, EvaluationJudge, RunService, StatusAggregator};

/// Selector reported by the scripted extractor.
const SCRIPTED_SELECTOR: &str = "body";

/// The three AI-backed collaborators.
pub struct Collaborators {
    /// Decides verdicts
    pub judge: Arc<dyn Judge>,
    /// Turns captures into transcripts
    pub extractor: Arc<dyn ConversationExtractor>,
    /// Merges failure reasons
    pub summarizer: Arc<dyn FailureSummarizer>,
}

impl Collaborators {
    /// Collaborators sharing one OpenAI client.
    pub fn openai(config: &Config) -> Result<Self> {
        let client = Arc::new(OpenAiClient::new(&config.openai).context("Failed to create OpenAI client")?);
        Ok(Self {
            judge: Arc::new(OpenAiJudge::new(Arc::clone(&client))),
            extractor: Arc::new(OpenAiExtractor::new(Arc::clone(&client))),
            summarizer: Arc::new(OpenAiSummarizer::new(client)),
        })
    }

    /// Offline collaborators: criterion-keyed judge, line-based extractor.
    pub fn scripted() -> Self {
        Self {
            judge: Arc::new(ScriptedJudge::new()),
            extractor: Arc::new(ScriptedExtractor::new(SCRIPTED_SELECTOR)),
            summarizer: Arc::new(JoiningSummarizer),
        }
    }

    /// Scripted collaborators when `scripted`, OpenAI ones otherwise.
    pub fn select(config: &Config, scripted: bool) -> Result<Self> {
        if scripted {
            Ok(Self::scripted())
        } else {
            Self::openai(config)
        }
    }
}

/// Repositories over the configured database.
pub struct AppContext {
    /// Run storage
    pub runs: Arc<SqliteRunRepository>,
    /// Catalog storage
    pub catalog: Arc<SqliteCatalogRepository>,
}

impl AppContext {
    /// Open (and migrate) the configured database.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = initialize_database(
            &database_url(&config.database.path),
            Some(PoolConfig::from(&config.database)),
        )
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))?;

        Ok(Self {
            runs: Arc::new(SqliteRunRepository::new(pool.clone())),
            catalog: Arc::new(SqliteCatalogRepository::new(pool)),
        })
    }

    /// Status aggregator over the run storage.
    pub fn aggregator(&self, summarizer: Arc<dyn FailureSummarizer>) -> StatusAggregator<SqliteRunRepository> {
        StatusAggregator::new(Arc::clone(&self.runs), summarizer)
    }

    /// Judge-then-aggregate pipeline running in the caller's task.
    pub fn cascade(&self, collaborators: &Collaborators) -> AggregationCascade<SqliteRunRepository, SqliteCatalogRepository> {
        let judge = EvaluationJudge::new(
            Arc::clone(&self.runs),
            Arc::clone(&self.catalog),
            Arc::clone(&collaborators.judge),
            Arc::clone(&collaborators.extractor),
            Arc::clone(&collaborators.summarizer),
        );
        AggregationCascade::new(judge, self.aggregator(Arc::clone(&collaborators.summarizer)))
    }

    /// Run service submitting through `dispatcher`.
    pub fn run_service(
        &self,
        summarizer: Arc<dyn FailureSummarizer>,
        dispatcher: Arc<dyn EvaluationDispatcher>,
    ) -> RunService<SqliteRunRepository, SqliteCatalogRepository> {
        RunService::new(
            Arc::clone(&self.runs),
            Arc::clone(&self.catalog),
            self.aggregator(summarizer),
            dispatcher,
        )
    }

    /// Baseline service extracting with `extractor`.
    pub fn baseline_service(&self, extractor: Arc<dyn ConversationExtractor>) -> BaselineService<SqliteCatalogRepository> {
        BaselineService::new(Arc::clone(&self.catalog), extractor)
    }
}
