//! Baseline transcript resolution.

use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Baseline;
use crate::domain::ports::{CatalogRepository, ConversationExtractor};
use crate::services::transcript_extraction::extract_transcript;

/// Turns baseline captures into the transcripts evaluations are judged against.
pub struct BaselineService<C: CatalogRepository> {
    catalog: Arc<C>,
    extractor: Arc<dyn ConversationExtractor>,
}

impl<C: CatalogRepository> BaselineService<C> {
    /// Service storing transcripts through `catalog`.
    pub fn new(catalog: Arc<C>, extractor: Arc<dyn ConversationExtractor>) -> Self {
        Self { catalog, extractor }
    }

    /// Extract and store the baseline's transcript, replacing any earlier one.
    #[instrument(skip(self))]
    pub async fn resolve_transcript(&self, baseline_id: Uuid) -> DomainResult<Baseline> {
        let baseline = self
            .catalog
            .get_baseline(baseline_id)
            .await?
            .ok_or(DomainError::BaselineNotFound(baseline_id))?;
        let test = self
            .catalog
            .get_test(baseline.test_id)
            .await?
            .ok_or(DomainError::TestNotFound(baseline.test_id))?;
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

        let transcript = extract_transcript(self.catalog.as_ref(), self.extractor.as_ref(), &bot, &baseline.html_capture)
            .await
            .ok_or_else(|| {
                DomainError::ExecutionFailed(format!("could not extract a transcript from baseline {baseline_id}"))
            })?;

        self.catalog.set_baseline_transcript(baseline_id, &transcript).await?;
        tracing::info!(baseline_id = %baseline_id, turns = transcript.len(), "Baseline transcript resolved");
        Ok(baseline.with_transcript(transcript))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted::ScriptedExtractor;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteCatalogRepository};
    use crate::domain::models::{Bot, Suite, Test, Turn};

    async fn setup(extractor: ScriptedExtractor, capture: &str) -> (BaselineService<SqliteCatalogRepository>, Arc<SqliteCatalogRepository>, Bot, Baseline) {
        let pool = create_migrated_test_pool().await.unwrap();
        let catalog = Arc::new(SqliteCatalogRepository::new(pool));

        let bot = Bot::new("bot");
        catalog.create_bot(&bot).await.unwrap();
        let suite = Suite::new(bot.id, "suite");
        catalog.create_suite(&suite).await.unwrap();
        let test = Test::new(suite.id, "test");
        catalog.create_test(&test).await.unwrap();
        let baseline = Baseline::new(test.id, "baseline", capture);
        catalog.create_baseline(&baseline).await.unwrap();

        let service = BaselineService::new(Arc::clone(&catalog), Arc::new(extractor));
        (service, catalog, bot, baseline)
    }

    #[tokio::test]
    async fn test_resolve_stores_transcript_and_learns_selector() {
        let (service, catalog, bot, baseline) =
            setup(ScriptedExtractor::new("div.chat"), "user: Where is my order?\nbot: It shipped.").await;

        let resolved = service.resolve_transcript(baseline.id).await.unwrap();
        let expected = vec![Turn::user("Where is my order?"), Turn::bot("It shipped.")];
        assert_eq!(resolved.transcript.as_ref().unwrap().turns(), expected.as_slice());

        let stored = catalog.get_baseline(baseline.id).await.unwrap().unwrap();
        assert!(stored.is_resolved());
        let bot = catalog.get_bot(bot.id).await.unwrap().unwrap();
        assert_eq!(bot.query_selector.as_deref(), Some("div.chat"));
    }

    #[tokio::test]
    async fn test_resolve_fails_on_empty_capture() {
        let (service, catalog, _, baseline) = setup(ScriptedExtractor::new("div.chat"), "<div></div>").await;

        let err = service.resolve_transcript(baseline.id).await.unwrap_err();
        assert!(matches!(err, DomainError::ExecutionFailed(_)));
        assert!(!catalog.get_baseline(baseline.id).await.unwrap().unwrap().is_resolved());
    }

    #[tokio::test]
    async fn test_resolve_unknown_baseline() {
        let (service, _, _, _) = setup(ScriptedExtractor::failing(), "user: hi").await;
        let err = service.resolve_transcript(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::BaselineNotFound(_)));
    }
}
