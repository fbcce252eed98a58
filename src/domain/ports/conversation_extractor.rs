//! Conversation extractor port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Transcript;

/// What the extractor knows about the page layout up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorHint<'a> {
    /// No selector learned yet; ask the extractor to report one.
    Learn,
    /// Reuse a previously learned selector.
    Known(&'a str),
}

impl SelectorHint<'_> {
    /// Whether the extractor should report a reusable selector.
    pub fn wants_selector(&self) -> bool {
        matches!(self, Self::Learn)
    }
}

/// Result of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Conversation found in the capture
    pub transcript: Transcript,
    /// Reusable selector, reported when one was requested.
    pub selector: Option<String>,
}

/// Turns a raw HTML capture into a structured transcript.
#[async_trait]
pub trait ConversationExtractor: Send + Sync {
    /// Extract the conversation in `html`.
    async fn extract(&self, html: &str, hint: SelectorHint<'_>) -> DomainResult<Extraction>;
}
