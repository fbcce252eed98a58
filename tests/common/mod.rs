//! Shared harness for integration tests.
//!
//! Builds a catalog of one bot and one suite on a migrated database, wires
//! the scripted collaborators into the judging pipeline and exposes the run
//! service the way the CLI uses it.

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use chatcheck::adapters::scripted::{JoiningSummarizer, ScriptedExtractor, ScriptedJudge};
use chatcheck::adapters::sqlite::{create_migrated_test_pool, SqliteCatalogRepository, SqliteRunRepository};
use chatcheck::domain::models::{Baseline, Bot, JudgingConfig, Suite, Test};
use chatcheck::domain::ports::{CatalogRepository, ConversationExtractor, FailureSummarizer, Judge};
use chatcheck::services::{
    AggregationCascade, EvaluationDispatcher, EvaluationJudge, JudgeQueue, RunService, StatusAggregator,
};

/// A capture the scripted extractor turns into a two-turn transcript.
#[allow(dead_code)]
pub const CAPTURE: &str = "<div class=\"chat\">\nuser: When does my refund arrive?\nbot: Within five days.\n</div>";

/// A capture with no conversation in it; extraction fails on it.
#[allow(dead_code)]
pub const EMPTY_CAPTURE: &str = "<div class=\"chat\"></div>";

pub type Runs = SqliteRunRepository;
pub type Catalog = SqliteCatalogRepository;

/// How submitted evaluations reach the judge.
#[allow(dead_code)]
pub enum Dispatch {
    /// Judge and aggregate inside `submit_evaluation`.
    Inline,
    /// Hand evaluations to a background judge queue.
    Queued(JudgingConfig),
}

#[allow(dead_code)]
pub struct Harness {
    pub runs: Arc<Runs>,
    pub catalog: Arc<Catalog>,
    pub judge: Arc<ScriptedJudge>,
    pub extractor: Arc<ScriptedExtractor>,
    pub aggregator: StatusAggregator<Runs>,
    pub cascade: Arc<AggregationCascade<Runs, Catalog>>,
    pub service: RunService<Runs, Catalog>,
    pub queue: Option<Arc<JudgeQueue>>,
    pub bot: Bot,
    pub suite: Suite,
}

#[allow(dead_code)]
impl Harness {
    /// In-memory harness judging inline.
    pub async fn new(judge: ScriptedJudge) -> Self {
        let pool = create_migrated_test_pool().await.expect("failed to create test pool");
        Self::build(pool, judge, Dispatch::Inline).await
    }

    pub async fn build(pool: SqlitePool, judge: ScriptedJudge, dispatch: Dispatch) -> Self {
        let runs = Arc::new(SqliteRunRepository::new(pool.clone()));
        let catalog = Arc::new(SqliteCatalogRepository::new(pool));
        let judge = Arc::new(judge);
        let extractor = Arc::new(ScriptedExtractor::new("div.chat"));
        let summarizer: Arc<dyn FailureSummarizer> = Arc::new(JoiningSummarizer);

        let aggregator = StatusAggregator::new(Arc::clone(&runs), Arc::clone(&summarizer));
        let engine = EvaluationJudge::new(
            Arc::clone(&runs),
            Arc::clone(&catalog),
            Arc::clone(&judge) as Arc<dyn Judge>,
            Arc::clone(&extractor) as Arc<dyn ConversationExtractor>,
            summarizer,
        );
        let cascade = Arc::new(AggregationCascade::new(engine, aggregator.clone()));

        let (dispatcher, queue) = match dispatch {
            Dispatch::Inline => (Arc::clone(&cascade) as Arc<dyn EvaluationDispatcher>, None),
            Dispatch::Queued(config) => {
                let queue = Arc::new(JudgeQueue::start(Arc::clone(&cascade) as Arc<dyn EvaluationDispatcher>, &config));
                (Arc::clone(&queue) as Arc<dyn EvaluationDispatcher>, Some(queue))
            }
        };

        let bot = Bot::new("Support bot");
        catalog.create_bot(&bot).await.expect("failed to create bot");
        let suite = Suite::new(bot.id, "Refunds");
        catalog.create_suite(&suite).await.expect("failed to create suite");

        let service = RunService::new(Arc::clone(&runs), Arc::clone(&catalog), aggregator.clone(), dispatcher);

        Self {
            runs,
            catalog,
            judge,
            extractor,
            aggregator,
            cascade,
            service,
            queue,
            bot,
            suite,
        }
    }

    /// Add a test to the suite with `baselines` resolved baselines.
    pub async fn add_test(&self, test: Test, baselines: usize) -> (Test, Vec<Baseline>) {
        self.catalog.create_test(&test).await.expect("failed to create test");

        let mut created = Vec::with_capacity(baselines);
        for i in 0..baselines {
            let baseline = Baseline::new(test.id, format!("baseline {i}"), CAPTURE)
                .with_transcript(ScriptedExtractor::parse(CAPTURE));
            self.catalog.create_baseline(&baseline).await.expect("failed to create baseline");
            created.push(baseline);
        }
        (test, created)
    }

    /// A new test in this harness's suite, not yet stored.
    pub fn test(&self, name: &str) -> Test {
        Test::new(self.suite.id, name)
    }

    /// Drain the judge queue, if there is one.
    pub async fn settle(&self) {
        if let Some(queue) = &self.queue {
            queue.shutdown().await;
        }
    }
}

/// Fresh environment id for a run.
#[allow(dead_code)]
pub fn environment() -> Uuid {
    Uuid::new_v4()
}

#[allow(dead_code)]
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("failed to create temp dir")
}

#[allow(dead_code)]
pub fn temp_db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("chatcheck.db")
}

#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
