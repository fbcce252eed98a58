//! Catalog repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Baseline, Bot, Suite, Test, Transcript};

/// Repository interface for the catalog entities the run engine reads.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Insert a bot.
    async fn create_bot(&self, bot: &Bot) -> DomainResult<()>;

    /// Load a bot.
    async fn get_bot(&self, id: Uuid) -> DomainResult<Option<Bot>>;

    /// Store a learned extraction selector. Last write wins.
    async fn set_bot_selector(&self, bot_id: Uuid, selector: &str) -> DomainResult<()>;

    /// Insert a suite.
    async fn create_suite(&self, suite: &Suite) -> DomainResult<()>;

    /// Load a suite.
    async fn get_suite(&self, id: Uuid) -> DomainResult<Option<Suite>>;

    /// Insert a test.
    async fn create_test(&self, test: &Test) -> DomainResult<()>;

    /// Load a test.
    async fn get_test(&self, id: Uuid) -> DomainResult<Option<Test>>;

    /// Tests of a suite in creation order.
    async fn list_tests(&self, suite_id: Uuid) -> DomainResult<Vec<Test>>;

    /// Insert a baseline.
    async fn create_baseline(&self, baseline: &Baseline) -> DomainResult<()>;

    /// Load a baseline.
    async fn get_baseline(&self, id: Uuid) -> DomainResult<Option<Baseline>>;

    /// Baselines of a test in creation order. Judging walks them in this order.
    async fn list_baselines(&self, test_id: Uuid) -> DomainResult<Vec<Baseline>>;

    /// Store the resolved transcript of a baseline.
    async fn set_baseline_transcript(&self, baseline_id: Uuid, transcript: &Transcript) -> DomainResult<()>;
}
