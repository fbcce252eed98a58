//! Transcript extraction with the bot-level selector cache.

use crate::domain::models::{Bot, Transcript};
use crate::domain::ports::{CatalogRepository, ConversationExtractor, SelectorHint};

/// Extract a transcript from `html` using `bot`'s learned selector.
///
/// When the bot has no selector yet, one is requested and stored for later
/// extractions. The store is best-effort: concurrent learners race and the
/// last write wins. Returns `None` when the extractor fails or finds no
/// conversation.
pub async fn extract_transcript<C>(
    catalog: &C,
    extractor: &dyn ConversationExtractor,
    bot: &Bot,
    html: &str,
) -> Option<Transcript>
where
    C: CatalogRepository + ?Sized,
{
    let hint = bot
        .query_selector
        .as_deref()
        .map_or(SelectorHint::Learn, SelectorHint::Known);

    let extraction = match extractor.extract(html, hint).await {
        Ok(extraction) => extraction,
        Err(e) => {
            tracing::warn!(bot_id = %bot.id, error = %e, "Conversation extraction failed");
            return None;
        }
    };

    if extraction.transcript.is_empty() {
        tracing::warn!(bot_id = %bot.id, "Conversation extraction produced an empty transcript");
        return None;
    }

    if hint.wants_selector() {
        if let Some(selector) = extraction.selector.as_deref().filter(|s| !s.trim().is_empty()) {
            match catalog.set_bot_selector(bot.id, selector).await {
                Ok(()) => tracing::info!(bot_id = %bot.id, selector, "Learned extraction selector"),
                Err(e) => tracing::warn!(bot_id = %bot.id, error = %e, "Failed to store extraction selector"),
            }
        }
    }

    Some(extraction.transcript)
}
